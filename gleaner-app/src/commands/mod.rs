pub mod listen;
pub mod run;
