//! Opcode semantics
//!
//! [`execute`] runs one opcode against a [`Machine`] with its load operands
//! already resolved. Results come back as a [`Flow`] for the engine to store.
//! All values are `u32`; signed readings happen only where an opcode needs them.

use super::machine::{DelayedStore, Flow, IoSystem, Machine};
use super::search;
use super::Opcode;
use crate::interpreter::errors::{VmError, VmResult};
use crate::memory::heap::HeapBacking;
use crate::memory::stack::CallStub;

/// Interpreter version reported by gestalt selector 1
pub const INTERPRETER_VERSION: u32 = 0x0000_0100;
/// Glulx version reported by gestalt selector 0
pub const GLULX_VERSION: u32 = 0x0003_0102;

pub fn add(a: u32, b: u32) -> u32 {
    a.wrapping_add(b)
}

pub fn sub(a: u32, b: u32) -> u32 {
    a.wrapping_sub(b)
}

pub fn mul(a: u32, b: u32) -> u32 {
    a.wrapping_mul(b)
}

pub fn div(a: u32, b: u32) -> VmResult<u32> {
    if b == 0 {
        return Err(VmError::DivisionByZero);
    }
    Ok((a as i32).wrapping_div(b as i32) as u32)
}

pub fn modulo(a: u32, b: u32) -> VmResult<u32> {
    if b == 0 {
        return Err(VmError::DivisionByZero);
    }
    Ok((a as i32).wrapping_rem(b as i32) as u32)
}

pub fn neg(a: u32) -> u32 {
    (a as i32).wrapping_neg() as u32
}

pub fn shift_left(a: u32, b: u32) -> u32 {
    if b >= 32 {
        0
    } else {
        a << b
    }
}

pub fn shift_right_signed(a: u32, b: u32) -> u32 {
    ((a as i32) >> b.min(31)) as u32
}

pub fn shift_right_unsigned(a: u32, b: u32) -> u32 {
    if b >= 32 {
        0
    } else {
        a >> b
    }
}

fn signed_less(a: u32, b: u32) -> bool {
    (a as i32) < (b as i32)
}

/// Gestalt answers that do not depend on the machine
fn gestalt<M: Machine>(m: &M, selector: u32, arg: u32) -> u32 {
    match selector {
        0 => GLULX_VERSION,
        1 => INTERPRETER_VERSION,
        2 | 3 | 5 | 6 | 7 | 9 => 1,
        4 => matches!(
            arg,
            IoSystem::NULL | IoSystem::FILTER | IoSystem::GLK | IoSystem::CHANNELS
        ) as u32,
        8 => m.heap_start(),
        10 => (1..=13).contains(&arg) as u32,
        _ => 0,
    }
}

fn branch_if<M: Machine>(m: &mut M, condition: bool, offset: u32) -> VmResult<Flow> {
    if condition {
        m.take_branch(offset)?;
    }
    Ok(Flow::Next)
}

fn pop_args<M: Machine>(m: &mut M, count: u32) -> VmResult<Vec<u32>> {
    (0..count).map(|_| m.stack_mut().pop()).collect()
}

/// Execute `op` with loaded operands `args`. `dest` is the delayed store for
/// opcodes with the `DelayedStore` or `Catch` rule.
pub fn execute<M: Machine>(
    m: &mut M,
    op: Opcode,
    args: &[u32],
    dest: DelayedStore,
) -> VmResult<Flow> {
    let arg = |i: usize| args.get(i).copied().unwrap_or(0);
    let (a, b, c) = (arg(0), arg(1), arg(2));

    let flow = match op {
        Opcode::Nop => Flow::Next,

        Opcode::Add => Flow::Store(add(a, b)),
        Opcode::Sub => Flow::Store(sub(a, b)),
        Opcode::Mul => Flow::Store(mul(a, b)),
        Opcode::Div => Flow::Store(div(a, b)?),
        Opcode::Mod => Flow::Store(modulo(a, b)?),
        Opcode::Neg => Flow::Store(neg(a)),
        Opcode::Bitand => Flow::Store(a & b),
        Opcode::Bitor => Flow::Store(a | b),
        Opcode::Bitxor => Flow::Store(a ^ b),
        Opcode::Bitnot => Flow::Store(!a),
        Opcode::Shiftl => Flow::Store(shift_left(a, b)),
        Opcode::Sshiftr => Flow::Store(shift_right_signed(a, b)),
        Opcode::Ushiftr => Flow::Store(shift_right_unsigned(a, b)),

        Opcode::Jump => branch_if(m, true, a)?,
        Opcode::Jz => branch_if(m, a == 0, b)?,
        Opcode::Jnz => branch_if(m, a != 0, b)?,
        Opcode::Jeq => branch_if(m, a == b, c)?,
        Opcode::Jne => branch_if(m, a != b, c)?,
        Opcode::Jlt => branch_if(m, signed_less(a, b), c)?,
        Opcode::Jge => branch_if(m, !signed_less(a, b), c)?,
        Opcode::Jgt => branch_if(m, signed_less(b, a), c)?,
        Opcode::Jle => branch_if(m, !signed_less(b, a), c)?,
        Opcode::Jltu => branch_if(m, a < b, c)?,
        Opcode::Jgeu => branch_if(m, a >= b, c)?,
        Opcode::Jgtu => branch_if(m, a > b, c)?,
        Opcode::Jleu => branch_if(m, a <= b, c)?,
        Opcode::Jumpabs => {
            m.set_pc(a);
            Flow::Next
        }

        Opcode::Call => {
            let call_args = pop_args(m, b)?;
            m.perform_call(a, &call_args, dest, false)?;
            Flow::Next
        }
        Opcode::Callf | Opcode::Callfi | Opcode::Callfii | Opcode::Callfiii => {
            m.perform_call(a, &args[1..], dest, false)?;
            Flow::Next
        }
        Opcode::Tailcall => {
            let call_args = pop_args(m, b)?;
            m.perform_call(a, &call_args, DelayedStore::NULL, true)?;
            Flow::Next
        }
        Opcode::Return => {
            m.leave_function(a)?;
            Flow::Next
        }
        Opcode::Catch => {
            let pc = m.pc();
            let fp = m.stack().fp;
            m.stack_mut().push_stub(CallStub {
                dest_type: dest.dest_type as u32,
                dest_addr: dest.dest_addr,
                pc,
                frame_ptr: fp,
            })?;
            let token = m.stack().sp;
            m.perform_delayed_store(dest, token)?;
            m.take_branch(a)?;
            Flow::Next
        }
        Opcode::Throw => {
            // tokens below the current frame are not rejected
            if b > m.stack().sp {
                return Err(VmError::InvalidCatchToken(b));
            }
            m.stack_mut().sp = b;
            m.resume_from_call_stub(a)?;
            Flow::Next
        }

        Opcode::Copy | Opcode::Copys | Opcode::Copyb => Flow::Store(a),
        Opcode::Sexs => Flow::Store(a as u16 as i16 as i32 as u32),
        Opcode::Sexb => Flow::Store(a as u8 as i8 as i32 as u32),

        Opcode::Aload => Flow::Store(m.image().read_u32(a.wrapping_add(b.wrapping_mul(4)))?),
        Opcode::Aloads => {
            Flow::Store(m.image().read_u16(a.wrapping_add(b.wrapping_mul(2)))? as u32)
        }
        Opcode::Aloadb => Flow::Store(m.image().read_byte(a.wrapping_add(b))? as u32),
        Opcode::Aloadbit => {
            let address = a.wrapping_add(((b as i32) >> 3) as u32);
            let bit = b & 7;
            Flow::Store(((m.image().read_byte(address)? >> bit) & 1) as u32)
        }
        Opcode::Astore => {
            m.image_mut().write_u32(a.wrapping_add(b.wrapping_mul(4)), c)?;
            Flow::Next
        }
        Opcode::Astores => {
            m.image_mut()
                .write_u16(a.wrapping_add(b.wrapping_mul(2)), c & 0xFFFF)?;
            Flow::Next
        }
        Opcode::Astoreb => {
            m.image_mut().write_byte(a.wrapping_add(b), c & 0xFF)?;
            Flow::Next
        }
        Opcode::Astorebit => {
            let address = a.wrapping_add(((b as i32) >> 3) as u32);
            let mask = 1u8 << (b & 7);
            let byte = m.image().read_byte(address)?;
            let byte = if c != 0 { byte | mask } else { byte & !mask };
            m.image_mut().write_byte(address, byte as u32)?;
            Flow::Next
        }

        Opcode::Stkcount => Flow::Store(m.stack().count()),
        Opcode::Stkpeek => Flow::Store(m.stack().peek(a)?),
        Opcode::Stkswap => {
            m.stack_mut().swap()?;
            Flow::Next
        }
        Opcode::Stkroll => {
            m.stack_mut().roll(a, b as i32)?;
            Flow::Next
        }
        Opcode::Stkcopy => {
            m.stack_mut().copy_top(a)?;
            Flow::Next
        }

        Opcode::Streamchar => {
            m.stream_char(a & 0xFF)?;
            Flow::Next
        }
        Opcode::Streamunichar => {
            m.stream_unichar(a)?;
            Flow::Next
        }
        Opcode::Streamnum => {
            m.stream_num(a)?;
            Flow::Next
        }
        Opcode::Streamstr => {
            m.stream_string(a)?;
            Flow::Next
        }

        Opcode::Gestalt => Flow::Store(gestalt(m, a, b)),
        Opcode::Debugtrap => return Err(VmError::DebugTrap(a)),
        Opcode::Getmemsize => Flow::Store(m.image().end_mem()),
        Opcode::Setmemsize => Flow::Store(m.set_mem_size(a)),

        Opcode::Random => Flow::Store(m.random(a)),
        Opcode::Setrandom => {
            m.set_random(a);
            Flow::Next
        }

        Opcode::Quit => {
            m.quit();
            Flow::Next
        }
        Opcode::Verify => Flow::Store(if m.image().verify() { 0 } else { 1 }),
        Opcode::Restart => {
            m.restart()?;
            Flow::Next
        }
        Opcode::Save => m.save(dest)?,
        Opcode::Restore => m.restore(dest)?,
        Opcode::Saveundo => m.save_undo(dest)?,
        Opcode::Restoreundo => m.restore_undo(dest)?,
        Opcode::Protect => {
            m.protect(a, b);
            Flow::Next
        }

        Opcode::Glk => {
            let glk_args = pop_args(m, b)?;
            Flow::Store(m.glk(a, &glk_args)?)
        }

        Opcode::Getstringtbl => Flow::Store(m.decoding_table()),
        Opcode::Setstringtbl => {
            m.set_decoding_table(a);
            Flow::Next
        }
        Opcode::Getiosys => {
            let (mode, rock) = m.io_system().mode_and_rock();
            Flow::StorePair(mode, rock)
        }
        Opcode::Setiosys => {
            m.set_io_system(a, b);
            Flow::Next
        }

        Opcode::Linearsearch => Flow::Store(search::linear_search(
            m.image(),
            a,
            b,
            c,
            arg(3),
            arg(4),
            arg(5),
            arg(6),
        )?),
        Opcode::Binarysearch => Flow::Store(search::binary_search(
            m.image(),
            a,
            b,
            c,
            arg(3),
            arg(4),
            arg(5),
            arg(6),
        )?),
        Opcode::Linkedsearch => Flow::Store(search::linked_search(
            m.image(),
            a,
            b,
            c,
            arg(3),
            arg(4),
            arg(5),
        )?),

        Opcode::Mzero => {
            m.image_mut().zero_bytes(b, a)?;
            Flow::Next
        }
        Opcode::Mcopy => {
            let bytes = m.image().read_bytes(b, a)?.to_vec();
            m.image_mut().write_bytes(c, &bytes)?;
            Flow::Next
        }
        Opcode::Malloc => Flow::Store(m.malloc(a)),
        Opcode::Mfree => {
            m.mfree(a)?;
            Flow::Next
        }

        Opcode::Accelfunc => {
            m.accel_func(a, b);
            Flow::Next
        }
        Opcode::Accelparam => {
            m.accel_param(a, b);
            Flow::Next
        }

        Opcode::Fyrecall => m.fyre_call(a, b, c)?,
    };
    Ok(flow)
}

/// `setmemsize` rules shared by engines: the new size must be a multiple of
/// 256 and not below the size declared by the game. Returns 0 on success.
pub fn resize_memory<B: HeapBacking>(
    backing: &mut B,
    size: u32,
    original_end: u32,
    heap_active: bool,
) -> u32 {
    if heap_active || size % 256 != 0 || size < original_end {
        return 1;
    }
    if backing.resize(size) {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraparound() {
        assert_eq!(add(0xFFFF_FFFF, 1), 0);
        assert_eq!(sub(0, 1), 0xFFFF_FFFF);
        assert_eq!(mul(0x10000, 0x10000), 0);
        assert_eq!(neg(0), 0);
        assert_eq!(neg(1), 0xFFFF_FFFF);
    }

    #[test]
    fn test_signed_division_truncates() {
        assert_eq!(div(-7i32 as u32, 2).unwrap(), -3i32 as u32);
        assert_eq!(div(7, -2i32 as u32).unwrap(), -3i32 as u32);
        assert_eq!(modulo(-7i32 as u32, 2).unwrap(), -1i32 as u32);
        assert_eq!(modulo(7, -2i32 as u32).unwrap(), 1);
        assert_eq!(div(0x8000_0000, 0xFFFF_FFFF).unwrap(), 0x8000_0000);
        assert!(matches!(div(1, 0), Err(VmError::DivisionByZero)));
        assert!(matches!(modulo(1, 0), Err(VmError::DivisionByZero)));
    }

    #[test]
    fn test_shifts() {
        assert_eq!(shift_left(1, 31), 0x8000_0000);
        assert_eq!(shift_left(1, 32), 0);
        assert_eq!(shift_right_unsigned(0x8000_0000, 31), 1);
        assert_eq!(shift_right_unsigned(0x8000_0000, 32), 0);
        assert_eq!(shift_right_signed(0x8000_0000, 4), 0xF800_0000);
        assert_eq!(shift_right_signed(0x8000_0000, 40), 0xFFFF_FFFF);
        assert_eq!(shift_right_signed(0x4000_0000, 40), 0);
    }

    struct Region(u32);

    impl HeapBacking for Region {
        fn end_mem(&self) -> u32 {
            self.0
        }
        fn resize(&mut self, new_end: u32) -> bool {
            self.0 = new_end;
            true
        }
    }

    #[test]
    fn test_resize_memory_rules() {
        let mut region = Region(0x1000);
        assert_eq!(resize_memory(&mut region, 0x1100, 0x1000, false), 0);
        assert_eq!(region.0, 0x1100);
        assert_eq!(resize_memory(&mut region, 0x1101, 0x1000, false), 1);
        assert_eq!(resize_memory(&mut region, 0x0F00, 0x1000, false), 1);
        assert_eq!(resize_memory(&mut region, 0x2000, 0x1000, true), 1);
    }
}
