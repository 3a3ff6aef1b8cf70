pub mod mips32;
