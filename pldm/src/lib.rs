// Licensed under the Apache-2.0 license

#![cfg_attr(all(target_arch = "riscv32", not(feature = "std")), no_std)]

extern crate alloc;

pub mod codec;
pub mod control;
pub mod entity;
pub mod error;
pub mod fd;
pub mod message;
pub mod msgbuf;
pub mod pdr;
pub mod protocol;
pub mod util;
