use std::collections::VecDeque;
use std::sync::Arc;
use crate::base::behavior::*;
use crate::base::module::{module_inner, ModuleBase, IsModule};

#[derive(Debug)]
pub struct QueueState<T> {
    pub storage: VecDeque<T>,
    capacity: usize,
}

impl<T> Default for QueueState<T> {
    fn default() -> Self {
        Self {
            storage: VecDeque::new(),
            capacity: usize::MAX,
        }
    }
}

/// Bounded in-order queue. Capacity is a runtime property so that it can
/// follow the configured command queue depth.
#[derive(Debug, Default)]
pub struct Queue<T> {
    base: ModuleBase<QueueState<T>, ()>,
}

impl<T> ModuleBehaviors for Queue<T> {
    fn tick_one(&mut self) {}
    fn reset(&mut self) {
        self.state_mut().storage.clear();
    }
}

impl<T> IsModule for Queue<T> {
    module_inner!(QueueState<T>, ());
}

impl<T> Queue<T> {
    pub fn new(capacity: usize) -> Self {
        let mut queue = Self { base: ModuleBase::default() };
        queue.init_conf(Arc::new(()));
        queue.state_mut().capacity = capacity;
        queue
    }

    pub fn len(&self) -> usize {
        self.state().storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().storage.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.state().capacity
    }

    pub fn try_enq(&mut self, data: T) -> Result<(), T> {
        if self.is_full() {
            return Err(data);
        }
        self.state_mut().storage.push_back(data);
        Ok(())
    }

    pub fn try_deq(&mut self) -> Option<T> {
        self.state_mut().storage.pop_front()
    }

    pub fn front(&self) -> Option<&T> {
        self.state().storage.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.state_mut().storage.front_mut()
    }
}
