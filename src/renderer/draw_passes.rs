use super::{
    FrameResources, RenderItemId, RenderItemRegistry, RenderLayer, SceneAssets, TextureHandle,
    VertexSource,
};
use crate::gpu::{Command, CommandList, ConstantSlot, PassKind};

pub(crate) struct PassInputs<'a> {
    pub registry: &'a RenderItemRegistry,
    pub assets: &'a SceneAssets,
    pub frame: &'a FrameResources,
    pub height_map: Option<TextureHandle>,
    pub wireframe: bool,
}

/// Records the fixed pass sequence: opaque (or wireframe), then sky, then transparent.
///
/// The sky is drawn with a less-or-equal depth test after the opaque geometry, so it only fills
/// uncovered pixels, and blending of the transparent pass needs everything else drawn first.
pub(crate) fn record_frame(inputs: &PassInputs, list: &mut CommandList) {
    let opaque = if inputs.wireframe {
        PassKind::Wireframe
    } else {
        PassKind::Opaque
    };

    begin_pass(inputs, list, opaque);
    list.push(Command::BindConstants {
        slot: ConstantSlot::Terrain,
        buffer: inputs.frame.terrain_cb.buffer_id(),
        offset: 0,
        size: inputs.frame.terrain_cb.element_size(),
    });
    if let Some(height_map) = inputs.height_map {
        bind_texture(inputs, list, height_map);
    }
    draw_items(inputs, list, inputs.registry.layer(RenderLayer::Opaque), false);
    list.push(Command::EndPass);

    begin_pass(inputs, list, PassKind::Sky);
    draw_items(inputs, list, inputs.registry.layer(RenderLayer::Sky), false);
    list.push(Command::EndPass);

    begin_pass(inputs, list, PassKind::Transparent);
    draw_items(
        inputs,
        list,
        inputs.registry.layer(RenderLayer::Transparent),
        true,
    );
    list.push(Command::EndPass);
}

fn begin_pass(inputs: &PassInputs, list: &mut CommandList, kind: PassKind) {
    list.push(Command::BeginPass(kind));
    list.push(Command::BindConstants {
        slot: ConstantSlot::Pass,
        buffer: inputs.frame.pass_cb.buffer_id(),
        offset: 0,
        size: inputs.frame.pass_cb.element_size(),
    });
}

fn bind_texture(inputs: &PassInputs, list: &mut CommandList, handle: TextureHandle) {
    let entry = inputs.assets.texture(handle);
    list.push(Command::BindTexture {
        descriptor: entry.descriptor(),
        texture: entry.texture,
    });
}

fn draw_items(inputs: &PassInputs, list: &mut CommandList, ids: &[RenderItemId], water: bool) {
    let frame = inputs.frame;
    for (position, &id) in ids.iter().enumerate() {
        let item = inputs.registry.item(id);
        let mesh = inputs.assets.mesh(item.mesh);
        let material = inputs.assets.material(item.material);

        let vertex_buffer = match mesh.vertex_source {
            VertexSource::Static(buffer) => buffer,
            VertexSource::PerFrame => frame.waves_vb.buffer_id(),
        };
        list.push(Command::BindVertexBuffer {
            buffer: vertex_buffer,
            stride: mesh.vertex_stride,
        });
        list.push(Command::BindIndexBuffer {
            buffer: mesh.index_buffer,
        });

        list.push(Command::BindConstants {
            slot: ConstantSlot::Object,
            buffer: frame.object_cb.buffer_id(),
            offset: frame.object_cb.element_offset(id.index()),
            size: frame.object_cb.element_size(),
        });
        list.push(Command::BindConstants {
            slot: ConstantSlot::Material,
            buffer: frame.material_cb.buffer_id(),
            offset: frame.material_cb.element_offset(item.material.index()),
            size: frame.material_cb.element_size(),
        });
        if water {
            list.push(Command::BindConstants {
                slot: ConstantSlot::Water,
                buffer: frame.water_cb.buffer_id(),
                offset: frame.water_cb.element_offset(position as u32),
                size: frame.water_cb.element_size(),
            });
        }
        if let Some(texture) = material.desc().diffuse_texture {
            bind_texture(inputs, list, texture);
        }

        list.push(Command::DrawIndexed {
            index_count: item.draw.index_count,
            start_index: item.draw.start_index,
            base_vertex: item.draw.base_vertex,
        });
    }
}
