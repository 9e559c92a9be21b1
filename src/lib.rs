//! Inject replacement method bodies into compiled JVM class files
//!
//! A patched method arrives as hex-encoded `method_info` bytes. Depending on what else is known
//! about it (see [`patch::PatchMode`]), it either goes into the class verbatim, gets its constant
//! pool references copied over from a reference class, or has its drifted indices corrected
//! against the original method before only its code is swapped in.

pub mod hex;
pub mod jvm;
pub mod patch;
