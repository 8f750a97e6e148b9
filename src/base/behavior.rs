use std::sync::Arc;

/// Behaviors shared by every clocked component.
pub trait ModuleBehaviors {
    /// Advance the component by one of its own clock edges.
    fn tick_one(&mut self);
    fn reset(&mut self);
}

pub trait Parameterizable {
    type ConfigType;

    fn conf(&self) -> &Self::ConfigType;
    fn init_conf(&mut self, conf: Arc<Self::ConfigType>);
}
