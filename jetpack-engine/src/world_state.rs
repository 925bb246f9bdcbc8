use crate::{ default, EngineConfig, ObjectDesc, ObjectId, Result, Scheduler };

/// Initial description of a world, handed to a [`Scheduler`] to simulate it
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    pub(crate) start_time: f64,
    pub(crate) objects: Vec<ObjectDesc>,
}

impl WorldState {
    pub fn new() -> Self {
        default()
    }

    /// Simulation time at which every object's initial motion is valid
    pub fn with_start_time(self, start_time: f64) -> Self {
        Self { start_time, ..self }
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn objects(&self) -> &[ObjectDesc] {
        &self.objects
    }

    pub fn push_object(&mut self, desc: ObjectDesc) -> Result<ObjectId> {
        desc.validate()?;
        let id = ObjectId::new(self.objects.len());
        self.objects.push(desc);
        Ok(id)
    }

    pub fn simulate(self, config: EngineConfig) -> Result<Scheduler> {
        Scheduler::new(self, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ rect_shape, Material };

    #[test]
    fn test_push_object() {
        let mut world = WorldState::new();
        let a = world.push_object(ObjectDesc::dynamic(rect_shape(1., 1.).unwrap(), 1.)).unwrap();
        let b = world.push_object(ObjectDesc::terrain(rect_shape(10., 1.).unwrap())).unwrap();
        assert_eq!(a.idx(), 0);
        assert_eq!(b.idx(), 1);
        assert_eq!(world.objects().len(), 2);

        let bad = ObjectDesc::dynamic(rect_shape(1., 1.).unwrap(), 1.)
            .with_material(Material::new(-1., 0.));
        assert!(world.push_object(bad).is_err());
        assert_eq!(world.objects().len(), 2);
    }
}
