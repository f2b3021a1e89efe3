pub mod ports;
pub mod duplicates;
pub mod merge_use_case;
pub mod lookup;
