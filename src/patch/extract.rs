use super::PatchError;
use crate::jvm::ClassFile;
use std::fmt;

/// Which method of a class to pick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSelector {
    /// Position in the class's method table
    Index(usize),
    Signature { name: String, descriptor: String },
}

impl MethodSelector {
    /// Parse a name immediately followed by a descriptor (eg. `foo(I)V`)
    pub fn parse_signature(signature: &str) -> Option<MethodSelector> {
        let split = signature.find('(')?;
        let (name, descriptor) = signature.split_at(split);
        if name.is_empty() {
            return None;
        }
        Some(MethodSelector::Signature {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
        })
    }
}

impl fmt::Display for MethodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodSelector::Index(index) => write!(f, "#{}", index),
            MethodSelector::Signature { name, descriptor } => write!(f, "{}{}", name, descriptor),
        }
    }
}

/// Encoding of one `method_info`, exactly as it appears in the class
///
/// This is the form expected as the original method in differential patching.
pub fn extract_method(class: &ClassFile, selector: &MethodSelector) -> Result<Vec<u8>, PatchError> {
    let position = match selector {
        MethodSelector::Index(index) if *index < class.methods.len() => Some(*index),
        MethodSelector::Index(_) => None,
        MethodSelector::Signature { name, descriptor } => {
            super::splice::find_method(class, name, descriptor)
        }
    };
    let method = position
        .map(|position| &class.methods[position])
        .ok_or_else(|| PatchError::MethodNotFound {
            method: selector.to_string(),
        })?;
    log::info!("Extracting method {}", selector);
    Ok(method.to_bytes()?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_signatures() {
        assert_eq!(
            MethodSelector::parse_signature("<init>(I)V"),
            Some(MethodSelector::Signature {
                name: "<init>".to_owned(),
                descriptor: "(I)V".to_owned()
            })
        );
        assert_eq!(MethodSelector::parse_signature("foo"), None);
        assert_eq!(MethodSelector::parse_signature("()V"), None);
    }
}
