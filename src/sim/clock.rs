/// One clock domain on the global picosecond time line. The first edge is
/// at time zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDomain {
    period_ps: u64,
    next_ps: u64,
}

impl ClockDomain {
    pub fn new(period_ps: u64) -> Self {
        Self {
            period_ps,
            next_ps: 0,
        }
    }

    pub fn period_ps(&self) -> u64 {
        self.period_ps
    }

    pub fn next_ps(&self) -> u64 {
        self.next_ps
    }

    pub fn is_due(&self, now_ps: u64) -> bool {
        self.next_ps <= now_ps
    }

    /// Consume the edge at `now_ps`. Returns false when no edge was due.
    pub fn advance(&mut self, now_ps: u64) -> bool {
        if !self.is_due(now_ps) {
            return false;
        }
        self.next_ps += self.period_ps;
        true
    }

    /// Frequency in MHz.
    pub fn mhz(&self) -> u64 {
        1_000_000 / self.period_ps.max(1)
    }
}

pub fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Global step: the largest interval that hits every clock edge.
pub fn global_step(periods: &[u64]) -> u64 {
    periods.iter().copied().fold(0, gcd).max(1)
}

#[cfg(test)]
mod tests {
    use super::{global_step, ClockDomain};

    #[test]
    fn step_is_gcd_of_periods() {
        assert_eq!(global_step(&[2500, 5000, 5000]), 2500);
        assert_eq!(global_step(&[3000, 4500]), 1500);
        assert_eq!(global_step(&[]), 1);
    }

    #[test]
    fn domain_fires_once_per_period() {
        let mut clk = ClockDomain::new(5000);
        let fired = (0..4)
            .map(|i| clk.advance(i * 2500))
            .collect::<Vec<_>>();
        assert_eq!(fired, vec![true, false, true, false]);
        assert_eq!(clk.mhz(), 200);
    }
}
