//! Concrete ops (spec §2 component D): the broadcast-lift adapter and
//! elementwise families, `Subtensor`, `Argmax`/`Sum`, `TransposeInplace`,
//! `Dot`, and `Gemm`.

pub mod dot;
pub mod elementwise;
pub mod gemm;
pub mod reduce;
pub mod subtensor;
pub mod transpose;
