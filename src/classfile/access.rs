//! Access flags of classes, fields and methods.
//!
//! The same bit can carry different meanings depending on where it appears (`0x0040` is
//! `ACC_VOLATILE` on a field and `ACC_BRIDGE` on a method), so the flag set only names the
//! meanings this crate inspects and keeps every other bit verbatim.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Access and property flags of a class, field or method
    pub struct AccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Method is synchronized
        const SYNCHRONIZED = 0x0020;
        /// Method is a compiler generated bridge
        const BRIDGE = 0x0040;
        /// Method takes a variable number of arguments
        const VARARGS = 0x0080;
        /// Method is implemented in native code
        const NATIVE = 0x0100;
        /// Class is an interface
        const INTERFACE = 0x0200;
        /// Declared abstract
        const ABSTRACT = 0x0400;
        /// Floating point mode is FP-strict
        const STRICT = 0x0800;
        /// Not present in the source code
        const SYNTHETIC = 0x1000;
        /// Class is an annotation interface
        const ANNOTATION = 0x2000;
        /// Class or field is an enum
        const ENUM = 0x4000;
        /// Class is a module, or parameter is mandated
        const MODULE = 0x8000;
    }
}

impl AccessFlags {
    /// Wrap raw flags, keeping every bit.
    #[must_use]
    pub fn from_raw(raw: u16) -> Self {
        Self::from_bits_retain(raw)
    }

    /// Method without a `Code` attribute.
    #[must_use]
    pub fn has_no_body(self) -> bool {
        self.intersects(AccessFlags::ABSTRACT | AccessFlags::NATIVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_bits_survive() {
        let flags = AccessFlags::from_raw(0x0001 | 0x0008 | 0x1000);
        assert!(flags.contains(AccessFlags::SYNTHETIC));
        assert_eq!(flags.bits(), 0x1009);
    }

    #[test]
    fn test_has_no_body() {
        assert!(AccessFlags::ABSTRACT.has_no_body());
        assert!((AccessFlags::PUBLIC | AccessFlags::NATIVE).has_no_body());
        assert!(!(AccessFlags::PUBLIC | AccessFlags::STATIC).has_no_body());
    }
}
