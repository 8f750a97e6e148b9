use crate::isa::{MacInitSource, MacResetMode};

/// Architecture registers shared by every cluster. Written through the IO
/// interface, read by lanes and DMA engines during their ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitectureState {
    pub cluster_mask_global: u32,
    pub unit_mask_global: u32,
    pub sync_cluster_mask_global: u32,
    pub accu_mac_high_bit_shift: u32,
    pub accu_mul_high_bit_shift: u32,
    pub mac_init_source: MacInitSource,
    pub mac_reset_mode: MacResetMode,
    pub dma_pad_top: u32,
    pub dma_pad_right: u32,
    pub dma_pad_bottom: u32,
    pub dma_pad_left: u32,
    pub dma_pad_value: u32,
}

impl Default for ArchitectureState {
    fn default() -> Self {
        Self {
            cluster_mask_global: u32::MAX,
            unit_mask_global: u32::MAX,
            sync_cluster_mask_global: 0,
            accu_mac_high_bit_shift: 0,
            accu_mul_high_bit_shift: 0,
            mac_init_source: MacInitSource::None,
            mac_reset_mode: MacResetMode::ZIncrement,
            dma_pad_top: 0,
            dma_pad_right: 0,
            dma_pad_bottom: 0,
            dma_pad_left: 0,
            dma_pad_value: 0,
        }
    }
}

impl ArchitectureState {
    pub fn cluster_selected(&self, cluster: usize) -> bool {
        (self.cluster_mask_global >> cluster) & 1 == 1
    }

    pub fn unit_selected(&self, unit: usize) -> bool {
        (self.unit_mask_global >> unit) & 1 == 1
    }
}
