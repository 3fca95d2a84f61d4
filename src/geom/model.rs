use super::MeshData;
use crate::renderer::Vertex;
use glam::{Vec2, Vec3};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("cannot read model {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed model: {0}")]
    Parse(String),
}

/// Loads a text mesh of the form
///
/// ```text
/// VertexCount: 3
/// TriangleCount: 1
/// VertexList (pos, normal)
/// {
///     px py pz nx ny nz
///     ...
/// }
/// TriangleList
/// {
///     i0 i1 i2
///     ...
/// }
/// ```
pub fn load_text_model(path: &Path) -> Result<MeshData, ModelError> {
    let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_owned(),
        source,
    })?;
    parse_text_model(&text)
}

pub fn parse_text_model(text: &str) -> Result<MeshData, ModelError> {
    let mut tokens = text.split_whitespace();

    let vertex_count = read_count(&mut tokens, "VertexCount:")?;
    let triangle_count = read_count(&mut tokens, "TriangleCount:")?;

    skip_until(&mut tokens, "{")?;
    let mut vertices = Vec::with_capacity(vertex_count);
    for index in 0..vertex_count {
        let mut values = [0.0f32; 6];
        for value in values.iter_mut() {
            *value = next_number(&mut tokens, || format!("vertex {}", index))?;
        }
        vertices.push(Vertex::new(
            Vec3::new(values[0], values[1], values[2]),
            Vec3::new(values[3], values[4], values[5]),
            Vec2::ZERO,
        ));
    }
    expect_token(&mut tokens, "}")?;

    skip_until(&mut tokens, "{")?;
    let mut indices = Vec::with_capacity(triangle_count * 3);
    for triangle in 0..triangle_count {
        for _ in 0..3 {
            let index: u32 = next_number(&mut tokens, || format!("triangle {}", triangle))?;
            if index as usize >= vertex_count {
                return Err(ModelError::Parse(format!(
                    "triangle {} references vertex {} of {}",
                    triangle, index, vertex_count
                )));
            }
            indices.push(index);
        }
    }
    expect_token(&mut tokens, "}")?;

    Ok(MeshData { vertices, indices })
}

fn read_count<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    label: &str,
) -> Result<usize, ModelError> {
    expect_token(tokens, label)?;
    next_number(tokens, || label.to_owned())
}

fn expect_token<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    expected: &str,
) -> Result<(), ModelError> {
    match tokens.next() {
        Some(token) if token == expected => Ok(()),
        Some(token) => Err(ModelError::Parse(format!(
            "expected `{}`, found `{}`",
            expected, token
        ))),
        None => Err(ModelError::Parse(format!(
            "expected `{}`, found end of file",
            expected
        ))),
    }
}

fn skip_until<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    marker: &str,
) -> Result<(), ModelError> {
    if tokens.any(|token| token == marker) {
        Ok(())
    } else {
        Err(ModelError::Parse(format!("missing `{}`", marker)))
    }
}

fn next_number<'a, T: std::str::FromStr>(
    tokens: &mut impl Iterator<Item = &'a str>,
    context: impl Fn() -> String,
) -> Result<T, ModelError> {
    let token = tokens
        .next()
        .ok_or_else(|| ModelError::Parse(format!("unexpected end of file in {}", context())))?;
    token
        .parse()
        .map_err(|_| ModelError::Parse(format!("bad number `{}` in {}", token, context())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = "VertexCount: 3
TriangleCount: 1
VertexList (pos, normal)
{
    0 0 0 0 1 0
    1 0 0 0 1 0
    0 0 1 0 1 0
}
TriangleList
{
    0 1 2
}
";

    #[test]
    fn parses_vertices_and_triangles() {
        let mesh = parse_text_model(TRIANGLE).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices[1].pos, Vec3::X);
        assert_eq!(mesh.vertices[2].normal, Vec3::Y);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let text = TRIANGLE.replace("0 1 2", "0 1 7");
        assert!(matches!(
            parse_text_model(&text),
            Err(ModelError::Parse(msg)) if msg.contains("vertex 7")
        ));
    }

    #[test]
    fn truncated_file_is_an_error() {
        let text = &TRIANGLE[..TRIANGLE.find("TriangleList").unwrap()];
        assert!(parse_text_model(text).is_err());
    }

    #[test]
    fn malformed_number_names_its_location() {
        let text = TRIANGLE.replace("1 0 0 0 1 0", "1 x 0 0 1 0");
        match parse_text_model(&text) {
            Err(ModelError::Parse(msg)) => assert!(msg.contains("bad number `x`"), "{}", msg),
            other => panic!("expected a parse error, got {:?}", other.map(|m| m.indices)),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_text_model(Path::new("/nonexistent/skull.txt")).unwrap_err();
        assert!(matches!(err, ModelError::Io { .. }));
    }
}
