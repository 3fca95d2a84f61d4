use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    min: Vec3,
    max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// The tightest box around `points`, or `None` when there are none.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Aabb::new(first, first), |aabb, p| {
            Aabb::new(aabb.min.min(p), aabb.max.max(p))
        }))
    }

    pub fn min(&self) -> Vec3 {
        self.min
    }

    pub fn max(&self) -> Vec3 {
        self.max
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn center(&self) -> Vec3 {
        (self.max + self.min) * 0.5
    }

    pub fn dimensions(&self) -> Vec3 {
        self.max - self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_of_points() {
        let aabb = Aabb::from_points([
            Vec3::new(1.0, -2.0, 0.0),
            Vec3::new(-3.0, 4.0, 1.0),
            Vec3::new(0.0, 0.0, -1.0),
        ])
        .unwrap();
        assert_eq!(aabb.min(), Vec3::new(-3.0, -2.0, -1.0));
        assert_eq!(aabb.max(), Vec3::new(1.0, 4.0, 1.0));
        assert_eq!(aabb.center(), Vec3::new(-1.0, 1.0, 0.0));
        assert!(Aabb::from_points(std::iter::empty()).is_none());

        let merged = aabb.union(&Aabb::new(Vec3::ZERO, Vec3::splat(5.0)));
        assert_eq!(merged.dimensions(), Vec3::new(8.0, 7.0, 6.0));
    }
}
