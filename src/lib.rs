pub mod base {
    pub mod behavior;
    pub mod mem;
    pub mod module;
}
pub mod builtin {
    pub mod fifo;
    pub mod queue;
}
pub mod sim {
    pub mod clock;
    pub mod config;
    pub mod flat_mem;
    pub mod script;
    pub mod stats;
    pub mod top;
}
pub mod arch_state;
pub mod bus;
pub mod cluster;
pub mod command;
pub mod command_proc;
pub mod dcma;
pub mod dma;
pub mod isa;
pub mod timeq;
pub mod unit;

#[cfg(test)]
mod unit_tests;
