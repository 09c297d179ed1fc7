//! Replacement bodies for stubbed methods.

use crate::{
    classfile::{
        access::AccessFlags,
        code::CodeAttribute,
        constantpool::ConstantPool,
        descriptor::{parameter_slots, returns_void},
        opcodes::{op, MethodCall},
    },
    Result,
};

/// Exception thrown by the stub of a method that returns a value.
pub const STUB_EXCEPTION: &str = "java/lang/UnsupportedOperationException";

/// Message passed to [`STUB_EXCEPTION`].
pub const STUB_MESSAGE: &str = "Method has been deleted";

/// Build the stub body of a method.
///
/// A method returning `void` simply returns. Any other method throws
/// `UnsupportedOperationException("Method has been deleted")`. The exception table and the
/// nested attributes of the original body are dropped, as the stub is straight-line code.
///
/// # Errors
/// Returns an error for an invalid descriptor or a full constant pool.
pub fn stub_body(
    pool: &mut ConstantPool,
    access: AccessFlags,
    descriptor: &str,
) -> Result<CodeAttribute> {
    let receiver = u16::from(!access.contains(AccessFlags::STATIC));
    let max_locals = parameter_slots(descriptor)?.saturating_add(receiver);

    if returns_void(descriptor) {
        return Ok(CodeAttribute {
            max_stack: 0,
            max_locals,
            code: vec![op::RETURN],
            exception_table: Vec::new(),
            attributes: Vec::new(),
        });
    }

    let class_index = pool.add_class(STUB_EXCEPTION)?;
    let message_index = pool.add_string(STUB_MESSAGE)?;
    let init_index = pool.add_method_ref(STUB_EXCEPTION, "<init>", "(Ljava/lang/String;)V")?;

    let mut code = Vec::with_capacity(12);
    code.push(op::NEW);
    code.extend_from_slice(&class_index.to_be_bytes());
    code.push(op::DUP);
    match u8::try_from(message_index) {
        Ok(short) => code.extend_from_slice(&[op::LDC, short]),
        Err(_) => {
            code.push(op::LDC_W);
            code.extend_from_slice(&message_index.to_be_bytes());
        }
    }
    code.push(MethodCall::InvokeSpecial as u8);
    code.extend_from_slice(&init_index.to_be_bytes());
    code.push(op::ATHROW);

    Ok(CodeAttribute {
        max_stack: 3,
        max_locals,
        code,
        exception_table: Vec::new(),
        attributes: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{constantpool::Constant, opcodes::instructions};

    #[test]
    fn test_void_stub() {
        let mut pool = ConstantPool::new();
        let code = stub_body(&mut pool, AccessFlags::PUBLIC, "(IJ)V").unwrap();
        assert_eq!(code.code, vec![op::RETURN]);
        assert_eq!(code.max_locals, 4);
        assert_eq!(code.max_stack, 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_throwing_stub() {
        let mut pool = ConstantPool::new();
        let code = stub_body(&mut pool, AccessFlags::STATIC, "(Ljava/lang/String;)I").unwrap();
        assert_eq!(code.max_stack, 3);
        assert_eq!(code.max_locals, 1);

        let opcodes: Vec<u8> = instructions(&code.code)
            .unwrap()
            .iter()
            .map(|insn| insn.opcode)
            .collect();
        assert_eq!(
            opcodes,
            vec![op::NEW, op::DUP, op::LDC, op::INVOKESPECIAL, op::ATHROW]
        );

        let Constant::String(index) = pool.get(u16::from(code.code[5])).unwrap() else {
            panic!("ldc of a non-string constant");
        };
        assert_eq!(pool.utf8(*index).unwrap(), STUB_MESSAGE);
    }

    #[test]
    fn test_stub_is_stable() {
        let mut pool = ConstantPool::new();
        let first = stub_body(&mut pool, AccessFlags::PUBLIC, "()J").unwrap();
        let slots = pool.len();
        let second = stub_body(&mut pool, AccessFlags::PUBLIC, "()J").unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.len(), slots);
    }
}
