pub mod cancel;
pub mod interval;
pub mod nucseq;
