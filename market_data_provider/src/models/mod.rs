pub mod bar;
pub mod symbol_info;
pub mod timeframe;
