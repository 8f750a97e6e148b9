use crate::builtin::fifo::ChainFifo;

/// Output FIFOs of every lane in a cluster, indexed by (unit, lane). Lane
/// `lanes` of each unit is its load/store lane. Units form a ring.
#[derive(Debug)]
pub struct ChainFabric {
    fifos: Vec<ChainFifo>,
    units: usize,
    lanes: usize,
}

/// Position of a lane inside a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneRef {
    pub unit: usize,
    pub lane: usize,
}

impl ChainFabric {
    /// `lanes` counts processing lanes only.
    pub fn new(units: usize, lanes: usize) -> Self {
        Self {
            fifos: vec![ChainFifo::default(); units * (lanes + 1)],
            units,
            lanes,
        }
    }

    fn index(&self, at: LaneRef) -> usize {
        at.unit * (self.lanes + 1) + at.lane
    }

    pub fn fifo(&self, at: LaneRef) -> &ChainFifo {
        &self.fifos[self.index(at)]
    }

    pub fn fifo_mut(&mut self, at: LaneRef) -> &mut ChainFifo {
        let index = self.index(at);
        &mut self.fifos[index]
    }

    pub fn ls_lane(&self) -> usize {
        self.lanes
    }

    pub fn left_unit(&self, unit: usize) -> usize {
        (unit + self.units - 1) % self.units
    }

    pub fn right_unit(&self, unit: usize) -> usize {
        (unit + 1) % self.units
    }

    /// Left neighbour of a lane. Processing lanes form a ring; the load/store
    /// lane sees lane 0 on its left.
    pub fn left_of(&self, at: LaneRef) -> LaneRef {
        let lane = if at.lane == self.lanes {
            0
        } else {
            (at.lane + self.lanes - 1) % self.lanes
        };
        LaneRef { unit: at.unit, lane }
    }

    /// Right neighbour; the load/store lane sees the last processing lane.
    pub fn right_of(&self, at: LaneRef) -> LaneRef {
        let lane = if at.lane == self.lanes {
            self.lanes - 1
        } else {
            (at.lane + 1) % self.lanes
        };
        LaneRef { unit: at.unit, lane }
    }

    pub fn ls_of(&self, unit: usize) -> LaneRef {
        LaneRef {
            unit,
            lane: self.lanes,
        }
    }

    pub fn clear(&mut self) {
        self.fifos.iter_mut().for_each(|f| f.clear());
    }
}
