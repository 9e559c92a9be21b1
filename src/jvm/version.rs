use super::{Deserialize, Error, Serialize};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    /// JVM class file version corresponding to Java SE 6, the first to define `StackMapTable`
    pub const JAVA6: Version = Version {
        major_version: 50,
        minor_version: 0,
    };

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version {
        major_version: 52,
        minor_version: 0,
    };

    /// From Java 7 onwards, the type-checking verifier is mandatory and every method with jumps
    /// needs an accurate `StackMapTable`
    pub fn requires_stack_map_frames(&self) -> bool {
        self.major_version > Version::JAVA6.major_version
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Version {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        let minor_version = u16::deserialize(reader)?;
        let major_version = u16::deserialize(reader)?;
        Ok(Version {
            major_version,
            minor_version,
        })
    }
}
