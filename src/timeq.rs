/*
Latency bookkeeping for the bus model.

A transfer accepted by a slave yields a `Ticket` describing when its payload becomes visible to
the initiator. The slave advances its own cycle counter on every bus clock edge and initiators
poll the ticket through the slave's `is_*_ready` queries.
*/

pub type Cycle = u64;

// Result of accepting a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    issued_at: Cycle,
    ready_at: Cycle,
    size_bytes: u32,
}

impl Ticket {
    pub fn new(issued_at: Cycle, latency: Cycle, size_bytes: u32) -> Self {
        Self {
            issued_at,
            ready_at: issued_at + latency,
            size_bytes,
        }
    }

    // Cycle at which the transfer was accepted.
    pub fn issued_at(&self) -> Cycle {
        self.issued_at
    }

    // Cycle at which the payload becomes visible to the initiator.
    pub fn ready_at(&self) -> Cycle {
        self.ready_at
    }

    pub fn size_bytes(&self) -> u32 {
        self.size_bytes
    }

    pub fn is_ready(&self, now: Cycle) -> bool {
        now >= self.ready_at
    }

    // Number of cycles until the ticket is ready.  Returns zero if already ready.
    pub fn remaining_cycles(&self, now: Cycle) -> Cycle {
        self.ready_at.saturating_sub(now)
    }
}

#[cfg(test)]
mod tests {
    use super::Ticket;

    #[test]
    fn ticket_becomes_ready_after_latency() {
        let ticket = Ticket::new(10, 37, 64);
        assert!(!ticket.is_ready(46));
        assert_eq!(ticket.remaining_cycles(46), 1);
        assert!(ticket.is_ready(47));
        assert_eq!(ticket.remaining_cycles(100), 0);
    }
}
