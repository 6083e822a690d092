use super::engine::Engine;
use super::errors::{VmError, VmResult};
use crate::image::Image;
use crate::memory::heap::HeapAllocator;
use crate::memory::stack::Stack;
use crate::opcodes::handlers::resize_memory;
use crate::opcodes::machine::{DelayedStore, Flow, IoSystem, Machine};
use log::debug;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

impl Machine for Engine {
    fn image(&self) -> &Image {
        &self.image
    }

    fn image_mut(&mut self) -> &mut Image {
        &mut self.image
    }

    fn stack(&self) -> &Stack {
        &self.stack
    }

    fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    fn pc(&self) -> u32 {
        self.pc
    }

    fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    fn take_branch(&mut self, offset: u32) -> VmResult<()> {
        self.branch(offset)
    }

    fn leave_function(&mut self, result: u32) -> VmResult<()> {
        self.return_from_function(result)
    }

    fn perform_call(
        &mut self,
        address: u32,
        args: &[u32],
        dest: DelayedStore,
        tail_call: bool,
    ) -> VmResult<()> {
        self.call_function(address, args, dest, tail_call)
    }

    fn perform_delayed_store(&mut self, dest: DelayedStore, value: u32) -> VmResult<()> {
        self.store_delayed(dest, value)
    }

    fn resume_from_call_stub(&mut self, result: u32) -> VmResult<()> {
        self.resume_call_stub(result)
    }

    fn quit(&mut self) {
        self.running = false;
    }

    fn restart(&mut self) -> VmResult<()> {
        self.restart_game()
    }

    fn io_system(&self) -> IoSystem {
        self.io_system
    }

    fn set_io_system(&mut self, mode: u32, rock: u32) {
        self.io_system = IoSystem::from_mode(mode, rock).unwrap_or_else(|| {
            debug!("unknown iosys {}, using null", mode);
            IoSystem::Null
        });
        debug!("iosys {:?}", self.io_system);
    }

    fn stream_char(&mut self, ch: u32) -> VmResult<()> {
        self.stream_char_core(ch)
    }

    fn stream_unichar(&mut self, ch: u32) -> VmResult<()> {
        self.stream_char_core(ch)
    }

    fn stream_num(&mut self, value: u32) -> VmResult<()> {
        self.print_number(value)
    }

    fn stream_string(&mut self, address: u32) -> VmResult<()> {
        self.print_string(address)
    }

    fn decoding_table(&self) -> u32 {
        self.decoding_table
    }

    fn set_decoding_table(&mut self, address: u32) {
        self.decoding_table = address;
    }

    fn set_mem_size(&mut self, size: u32) -> u32 {
        let original_end = self.image.original_end_mem();
        let heap_active = self.heap.is_some();
        resize_memory(&mut self.image, size, original_end, heap_active)
    }

    fn heap_start(&self) -> u32 {
        self.heap.as_ref().map_or(0, HeapAllocator::address)
    }

    fn malloc(&mut self, size: u32) -> u32 {
        if size == 0 {
            return 0;
        }
        let max_extent = self.options.max_heap_extent;
        let heap = self
            .heap
            .get_or_insert_with(|| HeapAllocator::new(self.image.end_mem(), max_extent));
        let address = heap.alloc(size, &mut self.image);
        if heap.block_count() == 0 {
            self.heap = None;
        }
        address.unwrap_or(0)
    }

    fn mfree(&mut self, address: u32) -> VmResult<()> {
        let heap = self.heap.as_mut().ok_or(VmError::InvalidFree(address))?;
        if !heap.free(address, &mut self.image) {
            return Err(VmError::InvalidFree(address));
        }
        if heap.block_count() == 0 {
            let start = heap.address();
            self.heap = None;
            if !self.image.set_end_mem(start) {
                debug!("could not shrink memory to {:#x}", start);
            }
        }
        Ok(())
    }

    fn protect(&mut self, start: u32, len: u32) {
        self.protection = (len > 0).then_some((start, len));
    }

    fn random(&mut self, range: u32) -> u32 {
        let range = range as i32;
        if range == 0 {
            self.rng.gen()
        } else if range > 0 {
            self.rng.gen_range(0..range) as u32
        } else {
            let magnitude = self.rng.gen_range(0..range.unsigned_abs());
            (magnitude as i32).wrapping_neg() as u32
        }
    }

    fn set_random(&mut self, seed: u32) {
        self.rng = if seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(seed as u64)
        };
    }

    fn save(&mut self, dest: DelayedStore) -> VmResult<Flow> {
        self.save_game(dest)
    }

    fn restore(&mut self, dest: DelayedStore) -> VmResult<Flow> {
        self.restore_game(dest)
    }

    fn save_undo(&mut self, dest: DelayedStore) -> VmResult<Flow> {
        self.save_undo_state(dest)
    }

    fn restore_undo(&mut self, dest: DelayedStore) -> VmResult<Flow> {
        self.restore_undo_state(dest)
    }

    fn glk(&mut self, selector: u32, args: &[u32]) -> VmResult<u32> {
        self.glk_call(selector, args)
    }

    fn fyre_call(&mut self, call: u32, x: u32, y: u32) -> VmResult<Flow> {
        self.system_call(call, x, y)
    }

    fn accel_func(&mut self, number: u32, address: u32) {
        if self.options.veneer_enabled {
            self.veneer.accel_func(number, address);
        }
    }

    fn accel_param(&mut self, index: u32, value: u32) {
        if self.options.veneer_enabled {
            self.veneer.accel_param(index, value);
        }
    }
}
