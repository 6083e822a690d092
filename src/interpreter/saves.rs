//! Saving, restoring, undo and restart
//!
//! A snapshot is a Quetzal file holding:
//! - `IFhd`: the first 128 bytes of the game file, checked on load
//! - `UMem`: RAM from `ram_start` to the current end of memory
//! - `Stks`: the stack up to `sp`, topped with a call stub for the save site
//! - `MAll`: heap block list, when a heap exists
//!
//! Loading pops that stub, so execution continues after the `save` (or
//! `saveundo`) that made the snapshot, with [`RESTORED`] stored at its site.

use super::constants::RESTORED;
use super::engine::Engine;
use super::errors::{VmError, VmResult};
use super::host::{Awaiting, HostRequest};
use crate::memory::heap::HeapAllocator;
use crate::memory::stack::CallStub;
use crate::opcodes::machine::{DelayedStore, Flow};
use crate::snapshot::quetzal::Quetzal;
use log::debug;

impl Engine {
    /// Snapshot the game so that loading it resumes at the current `pc`,
    /// storing into `dest`
    pub fn save_to_quetzal(&mut self, dest: DelayedStore) -> VmResult<Quetzal> {
        let mut quetzal = Quetzal::new();
        self.image.save_to_quetzal(&mut quetzal);
        if let Some(heap) = &self.heap {
            quetzal.add_chunk(*b"MAll", heap.save());
        }

        let stub = CallStub::new(dest.dest_type, dest.dest_addr, self.pc, self.stack.fp);
        self.stack.push_stub(stub)?;
        quetzal.add_chunk(*b"Stks", self.stack.contents().to_vec());
        self.stack.pop_stub()?;

        debug!("saved state at pc {:#010x}", self.pc);
        Ok(quetzal)
    }

    /// Replace the game state with a snapshot from [`save_to_quetzal`](Self::save_to_quetzal)
    pub fn load_from_quetzal(&mut self, quetzal: &Quetzal) -> VmResult<()> {
        let original = self.image.original_ifhd();
        match quetzal.get_chunk(*b"IFhd") {
            Some(ifhd) if ifhd == original.as_slice() => {}
            _ => return Err(VmError::SaveMismatch),
        }
        let stks = quetzal
            .get_chunk(*b"Stks")
            .ok_or(VmError::MissingChunk("Stks"))?;

        self.image.restore_from_quetzal(quetzal, None)?;
        self.stack.load(stks)?;

        self.heap = match quetzal.get_chunk(*b"MAll") {
            Some(data) => {
                let heap =
                    HeapAllocator::restore(data, self.options.max_heap_extent, &mut self.image)
                        .ok_or(VmError::CorruptChunk("MAll"))?;
                (heap.block_count() > 0).then_some(heap)
            }
            None => None,
        };

        self.awaiting = None;
        self.request = None;
        self.resume_call_stub(RESTORED)?;
        debug!("restored state, resuming at {:#010x}", self.pc);
        Ok(())
    }

    pub(crate) fn save_game(&mut self, dest: DelayedStore) -> VmResult<Flow> {
        if !self.capabilities.save {
            self.store_delayed(dest, 1)?;
            return Ok(Flow::Next);
        }
        let quetzal = self.save_to_quetzal(dest)?;
        self.suspend(HostRequest::Save(quetzal.serialize()), Awaiting::Save(dest))
    }

    pub(crate) fn restore_game(&mut self, dest: DelayedStore) -> VmResult<Flow> {
        if !self.capabilities.load {
            self.store_delayed(dest, 1)?;
            return Ok(Flow::Next);
        }
        self.suspend(HostRequest::Load, Awaiting::Restore(dest))
    }

    pub(crate) fn save_undo_state(&mut self, dest: DelayedStore) -> VmResult<Flow> {
        let quetzal = self.save_to_quetzal(dest)?;
        if self.capabilities.undo {
            return self.suspend(
                HostRequest::SaveUndo(quetzal.serialize()),
                Awaiting::SaveUndo(dest),
            );
        }
        let stored = self.undo.push(quetzal.serialize());
        self.store_delayed(dest, if stored { 0 } else { 1 })?;
        Ok(Flow::Next)
    }

    pub(crate) fn restore_undo_state(&mut self, dest: DelayedStore) -> VmResult<Flow> {
        if self.capabilities.undo {
            return self.suspend(HostRequest::RestoreUndo, Awaiting::RestoreUndo(dest));
        }
        match self.undo.pop() {
            Some(bytes) => {
                let quetzal = Quetzal::load(&bytes)?;
                self.load_from_quetzal(&quetzal)?;
            }
            None => self.store_delayed(dest, 1)?,
        }
        Ok(Flow::Next)
    }

    /// Reload the game file, keeping the protected range, and start over
    pub(crate) fn restart_game(&mut self) -> VmResult<()> {
        debug!("restart");
        self.image.revert(self.protection)?;
        self.heap = None;
        self.decoding_table = self.image.header().decoding_table;
        self.bootstrap()
    }

    pub(crate) fn suspend(&mut self, request: HostRequest, awaiting: Awaiting) -> VmResult<Flow> {
        self.request = Some(request);
        self.awaiting = Some(awaiting);
        Ok(Flow::Wait)
    }
}
