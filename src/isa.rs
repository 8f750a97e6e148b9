use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use phf::phf_map;

/// Longest ALU pipeline a command may request.
pub const MAX_ALU_DEPTH: usize = 16;
pub const DEFAULT_ALU_DEPTH: usize = 3;
/// Physical pipeline slots per lane.
pub const PIPELINE_SLOTS: usize = 5 + MAX_ALU_DEPTH;
/// Stage that consumes chained offsets; chained data is read one stage later.
pub const CHAIN_TARGET_STAGE: usize = 3;

pub const MAX_X_END: u32 = (1 << 6) - 1;
pub const MAX_Y_END: u32 = (1 << 6) - 1;
pub const MAX_Z_END: u32 = (1 << 10) - 1;

/// `fu_sel` value of commands without a hardware class (e.g. the idle command).
pub const FU_SEL_OTHER: u32 = 99;

#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq, Default)]
pub enum SrcSel {
    #[default]
    Addr = 0,
    Imm = 1,
    Ls = 2,
    Left = 3,
    Right = 4,
    IndirectLs = 5,
    IndirectLeft = 6,
    IndirectRight = 7,
}

impl SrcSel {
    pub fn from_bits(bits: u32) -> Self {
        Self::from_u32(bits & 0b111).unwrap_or_default()
    }

    /// operand data arrives through a neighbour's chain FIFO
    pub fn is_chain_data(self) -> bool {
        matches!(self, SrcSel::Ls | SrcSel::Left | SrcSel::Right)
    }

    /// operand offset arrives through a neighbour's chain FIFO
    pub fn is_indirect(self) -> bool {
        matches!(self, SrcSel::IndirectLs | SrcSel::IndirectLeft | SrcSel::IndirectRight)
    }

    pub fn chains_left(self) -> bool {
        matches!(self, SrcSel::Left | SrcSel::IndirectLeft)
    }

    pub fn chains_right(self) -> bool {
        matches!(self, SrcSel::Right | SrcSel::IndirectRight)
    }

    pub fn chains_ls(self) -> bool {
        matches!(self, SrcSel::Ls | SrcSel::IndirectLs)
    }
}

#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq)]
pub enum FuClass {
    Mem = 0,
    Alu = 1,
    Special = 2,
    Transfer = 3,
}

#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacInitSource {
    #[default]
    None = 0b000,
    Imm = 0b001,
    Addr = 0b011,
    Zero = 0b101,
}

#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacResetMode {
    Never = 0b000,
    Once = 0b001,
    #[default]
    ZIncrement = 0b011,
    YIncrement = 0b101,
    XIncrement = 0b110,
}

// keyed by `fu_sel << 5 | func`
static OPCODES: phf::Map<u16, VproKind> = phf_map! {
    0b00_00000u16 => VproKind::Load,
    0b00_00001u16 => VproKind::LoadB,
    0b00_00010u16 => VproKind::LoadS,
    0b00_00011u16 => VproKind::LoadBS,
    0b00_00101u16 => VproKind::LoadReverse,
    0b00_00110u16 => VproKind::LoadSShiftLeft,
    0b00_00111u16 => VproKind::LoadSShiftRight,
    0b00_01000u16 => VproKind::Store,
    0b00_01001u16 => VproKind::StoreShiftLeft,
    0b00_01010u16 => VproKind::StoreShiftRight,
    0b00_01011u16 => VproKind::StoreReverse,
    0b01_00000u16 => VproKind::Add,
    0b01_00001u16 => VproKind::Sub,
    0b01_00010u16 => VproKind::MacLPre,
    0b01_00011u16 => VproKind::MacHPre,
    0b01_00100u16 => VproKind::MulL,
    0b01_00101u16 => VproKind::MacL,
    0b01_00110u16 => VproKind::MulH,
    0b01_00111u16 => VproKind::MacH,
    0b01_01000u16 => VproKind::Xor,
    0b01_01001u16 => VproKind::Xnor,
    0b01_01010u16 => VproKind::And,
    0b01_01100u16 => VproKind::Nand,
    0b01_01101u16 => VproKind::Or,
    0b01_01111u16 => VproKind::Nor,
    0b01_10000u16 => VproKind::DivL,
    0b01_10001u16 => VproKind::DivH,
    0b10_00000u16 => VproKind::ShiftLL,
    0b10_00001u16 => VproKind::ShiftLR,
    0b10_00011u16 => VproKind::ShiftAR,
    0b10_00100u16 => VproKind::Abs,
    0b10_00110u16 => VproKind::Min,
    0b10_00111u16 => VproKind::Max,
    0b10_01101u16 => VproKind::MaxVector,
    0b10_01110u16 => VproKind::MinVector,
    0b10_01111u16 => VproKind::BitReversal,
    0b11_00000u16 => VproKind::MvZe,
    0b11_00001u16 => VproKind::MvNz,
    0b11_00010u16 => VproKind::MvMi,
    0b11_00011u16 => VproKind::MvPl,
    0b11_00100u16 => VproKind::MulLNeg,
    0b11_00101u16 => VproKind::MulLPos,
    0b11_00110u16 => VproKind::MulHNeg,
    0b11_00111u16 => VproKind::MulHPos,
    0b11_01010u16 => VproKind::ShiftARNeg,
    0b11_01011u16 => VproKind::ShiftARPos,
};

/// Decoded operation of a vector command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VproKind {
    #[default]
    None,
    Load,
    LoadB,
    LoadS,
    LoadBS,
    Store,
    LoadSShiftLeft,
    LoadSShiftRight,
    StoreShiftLeft,
    StoreShiftRight,
    LoadReverse,
    StoreReverse,
    Add,
    Sub,
    MulL,
    MulH,
    MacL,
    DivL,
    DivH,
    MacH,
    MacLPre,
    MacHPre,
    Xor,
    Xnor,
    And,
    Nand,
    Or,
    Nor,
    ShiftLR,
    ShiftAR,
    ShiftLL,
    Abs,
    Min,
    Max,
    MinVector,
    MaxVector,
    BitReversal,
    MvZe,
    MvNz,
    MvMi,
    MvPl,
    ShiftARNeg,
    ShiftARPos,
    MulLNeg,
    MulLPos,
    MulHNeg,
    MulHPos,
    Nop,
    WaitBusy,
    PipelineWait,
}

impl VproKind {
    pub fn decode(fu_sel: u32, func: u32) -> Option<VproKind> {
        FuClass::from_u32(fu_sel)?;
        if func > 0b11111 {
            return None;
        }
        OPCODES.get(&(((fu_sel << 5) | func) as u16)).copied()
    }

    pub fn writes_rf(self) -> bool {
        use VproKind::*;
        matches!(
            self,
            Add | Sub | MulL | MulH | DivL | DivH | MacL | MacH | MacLPre | MacHPre | Xor | Xnor
                | And | Nand | Or | Nor | ShiftLR | ShiftAR | ShiftLL | MvZe | MvNz | MvMi | MvPl
                | ShiftARNeg | ShiftARPos | MulLNeg | MulLPos | MulHNeg | MulHPos | Min | Max
                | Abs | MinVector | MaxVector | BitReversal
        )
    }

    pub fn writes_lm(self) -> bool {
        use VproKind::*;
        matches!(self, Store | StoreShiftLeft | StoreShiftRight | StoreReverse)
    }

    pub fn is_load(self) -> bool {
        use VproKind::*;
        matches!(
            self,
            Load | LoadB | LoadBS | LoadS | LoadSShiftLeft | LoadSShiftRight | LoadReverse
        )
    }

    pub fn is_ls(self) -> bool {
        self.is_load() || self.writes_lm()
    }

    /// kinds whose second operand feeds the 18-bit multiplier port
    pub fn uses_multiplier(self) -> bool {
        use VproKind::*;
        matches!(
            self,
            MulL | MulH | MacL | MacH | MacLPre | MacHPre | MulLNeg | MulHNeg | MulLPos | MulHPos
        )
    }

    /// conditional kinds that fall back to operand a when their condition fails
    pub fn is_conditional_alu(self) -> bool {
        use VproKind::*;
        matches!(self, MulLNeg | MulHNeg | ShiftARNeg | MulLPos | MulHPos | ShiftARPos)
    }

    pub fn mnemonic(self) -> &'static str {
        use VproKind::*;
        match self {
            None => "NONE",
            Load => "LOAD",
            LoadB => "LOADB",
            LoadS => "LOADS",
            LoadBS => "LOADBS",
            Store => "STORE",
            LoadSShiftLeft => "LD_SFT_L",
            LoadSShiftRight => "LD_SFT_R",
            StoreShiftLeft => "ST_SFT_L",
            StoreShiftRight => "ST_SFT_R",
            LoadReverse => "LOAD_REV",
            StoreReverse => "STORE_REV",
            Add => "ADD",
            Sub => "SUB",
            MulL => "MULL",
            MulH => "MULH",
            MacL => "MACL",
            DivL => "DIVL",
            DivH => "DIVH",
            MacH => "MACH",
            MacLPre => "MACL_PRE",
            MacHPre => "MACH_PRE",
            Xor => "XOR",
            Xnor => "XNOR",
            And => "AND",
            Nand => "NAND",
            Or => "OR",
            Nor => "NOR",
            ShiftLR => "SHIFT_LR",
            ShiftAR => "SHIFT_AR",
            ShiftLL => "SHIFT_LL",
            Abs => "ABS",
            Min => "MIN",
            Max => "MAX",
            MinVector => "MIN_VEC",
            MaxVector => "MAX_VEC",
            BitReversal => "BIT_REV",
            MvZe => "MV_ZE",
            MvNz => "MV_NZ",
            MvMi => "MV_MI",
            MvPl => "MV_PL",
            ShiftARNeg => "SHFTR_NEG",
            ShiftARPos => "SHFTR_POS",
            MulLNeg => "MULL_NEG",
            MulLPos => "MULL_POS",
            MulHNeg => "MULH_NEG",
            MulHPos => "MULH_POS",
            Nop => "NOP",
            WaitBusy => "WAIT_BUSY",
            PipelineWait => "PIPELN_W8",
        }
    }
}

// Fixed-width conversions of the lane datapath. Values travel as i32 holding
// a sign-extended 24-bit word.

pub fn s24(v: u32) -> i32 {
    ((v << 8) as i32) >> 8
}

pub fn s18(v: u32) -> i32 {
    ((v << 14) as i32) >> 14
}

pub fn s16(v: u32) -> i32 {
    v as u16 as i16 as i32
}

pub fn s8(v: u32) -> i32 {
    v as u8 as i8 as i32
}

pub fn u24(v: u32) -> u32 {
    v & 0x00ff_ffff
}
