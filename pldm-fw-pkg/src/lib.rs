/*++

Licensed under the Apache-2.0 license.

--*/

//! Host-side tooling for PLDM firmware-update packages (DSP0267).
//!
//! [`manifest`] builds a [`FirmwareManifest`] from a TOML description and
//! encodes/decodes it against the binary package format using `std::io`;
//! it is the authoring path, e.g. for a packaging tool turning a manifest
//! and component images into a `.pldm` file. [`parser`] reads an
//! already-in-memory package back out through [`pldm::msgbuf`], borrowing
//! from the caller's buffer instead of allocating, for embedding in a UA
//! that only needs to inspect a package it already has bytes for.

pub mod manifest;
pub mod parser;

pub use manifest::FirmwareManifest;
