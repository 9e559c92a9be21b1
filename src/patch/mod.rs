//! Applying a patched method body to a class
//!
//! The [`apply_patch`] pipeline decodes the patched method, interprets it against the right
//! constant pool for the [`PatchMode`], splices it into the target class, and finally hands the
//! class to a [`FrameRecomputer`]. Either the whole pipeline succeeds, or no class bytes come out.

mod align;
mod errors;
mod extract;
mod frames;
mod method;
mod remap;
mod splice;

pub use align::*;
pub use errors::*;
pub use extract::*;
pub use frames::*;
pub use method::*;
pub use remap::*;
pub use splice::*;

use crate::hex::{self, HexDecoding};
use crate::jvm::ClassFile;

/// How the patched method bytes relate to the target class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchMode {
    /// Patched bytes already use the target class's constant pool numbering
    Direct,

    /// Patched bytes use the numbering of this reference class, and get copied into the target
    Reference(Vec<u8>),

    /// Patched bytes were derived from this original method (as hex), found in the target class.
    /// Only the `Code` attribute of that method gets replaced.
    Differential(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRequest {
    pub target_class: Vec<u8>,
    pub patched_method_hex: String,
    pub mode: PatchMode,
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// How to decode the patched (and original) method hex
    pub hex_decoding: HexDecoding,
}

impl Settings {
    pub fn new(hex_decoding: HexDecoding) -> Settings {
        Settings { hex_decoding }
    }
}

/// Method that ended up in the output class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedMethod {
    pub name: String,
    pub descriptor: String,

    /// Whether a method with this signature was already in the class
    pub replaced_existing: bool,
}

#[derive(Debug, Clone)]
pub struct PatchOutcome {
    /// Final class bytes (never empty)
    pub bytes: Vec<u8>,
    pub method: PatchedMethod,
}

/// Run the whole patch pipeline
pub fn apply_patch(
    request: &PatchRequest,
    settings: &Settings,
    frames: &dyn FrameRecomputer,
) -> Result<PatchOutcome, PatchError> {
    let mut patched = hex::decode(&request.patched_method_hex, settings.hex_decoding)?;
    log::info!("Decoded {} bytes of patched method", patched.len());

    let mut class = ClassFile::parse(&request.target_class)?;
    log::info!(
        "Parsed target class {} ({} methods, {} constants)",
        class.name().unwrap_or("?"),
        class.methods.len(),
        class.constants.len()
    );

    let method = match &request.mode {
        PatchMode::Differential(original_hex) => {
            log::info!("Applying patch in differential mode");
            let original = hex::decode(original_hex, settings.hex_decoding)?;
            patch_differential(&mut class, &mut patched, &original)?
        }
        PatchMode::Reference(reference_class) => {
            log::info!("Applying patch in reference mode");
            let reference = ClassFile::parse(reference_class)?;
            patch_reference(&mut class, &patched, &reference)?
        }
        PatchMode::Direct => {
            log::info!("Applying patch in direct mode");
            patch_direct(&mut class, &patched)?
        }
    };

    let bytes = class.to_bytes()?;
    let bytes = frames.recompute(bytes)?;
    if bytes.is_empty() {
        return Err(PatchError::EmptyOutput);
    }
    log::info!("Patched class is {} bytes", bytes.len());
    Ok(PatchOutcome { bytes, method })
}

/// Fix the patched bytes against the original, then swap only the code of the original method
fn patch_differential(
    class: &mut ClassFile,
    patched: &mut [u8],
    original: &[u8],
) -> Result<PatchedMethod, PatchError> {
    match align(patched, original, &class.constants) {
        Ok(report) => log::info!(
            "Aligned {} attributes, corrected {} of {} indices",
            report.attributes,
            report.corrected,
            report.visited
        ),
        Err(err) => log::warn!("Alignment stopped early (keeping earlier corrections): {}", err),
    }

    let original = MethodStructure::parse(original, &class.constants, Strictness::Strict)?;
    let patch = MethodStructure::parse(patched, &class.constants, Strictness::Lenient)?;

    let position = find_method(class, &original.name, &original.descriptor).ok_or_else(|| {
        PatchError::MethodNotFound {
            method: format!("{}{}", original.name, original.descriptor),
        }
    })?;
    log::info!("Patching code of {}{}", original.name, original.descriptor);
    replace_code_only(&mut class.methods[position], &class.constants, &patch)?;

    Ok(PatchedMethod {
        name: original.name,
        descriptor: original.descriptor,
        replaced_existing: true,
    })
}

/// Copy the patched method out of the reference class's numbering into the target
fn patch_reference(
    class: &mut ClassFile,
    patched: &[u8],
    reference: &ClassFile,
) -> Result<PatchedMethod, PatchError> {
    let patch = MethodStructure::parse(patched, &reference.constants, Strictness::Lenient)?;
    require_code(&patch)?;

    let method = Remapper::new(&reference.constants, &mut class.constants).copy_method(&patch)?;
    let replaced_existing = add_or_replace(class, &patch.name, &patch.descriptor, method);

    Ok(PatchedMethod {
        name: patch.name,
        descriptor: patch.descriptor,
        replaced_existing,
    })
}

/// Insert the patched method as-is
fn patch_direct(class: &mut ClassFile, patched: &[u8]) -> Result<PatchedMethod, PatchError> {
    let patch = MethodStructure::parse(patched, &class.constants, Strictness::Lenient)?;
    require_code(&patch)?;

    let method = patch.to_method()?;
    let replaced_existing = add_or_replace(class, &patch.name, &patch.descriptor, method);

    Ok(PatchedMethod {
        name: patch.name,
        descriptor: patch.descriptor,
        replaced_existing,
    })
}

/// Methods that aren't `abstract` or `native` must come with code
fn require_code(patch: &MethodStructure) -> Result<(), PatchError> {
    if patch.code().is_none() && !patch.access_flags.has_no_code() {
        return Err(PatchError::MissingCodeAttribute {
            method: format!("{}{}", patch.name, patch.descriptor),
        });
    }
    Ok(())
}
