//! Native replacements for Inform's veneer routines
//!
//! A game tells the engine where its copies of the standard helper routines
//! live, through fyrecall `SetVeneer` or the `accelfunc`/`accelparam` opcodes.
//! Calls to those addresses are then answered here instead of by running the
//! bytecode. The results match what the bytecode computes, including the
//! object layout and the sorted property table format.
//!
//! Object-model misuse (reading a property of a non-object and so on) is logged
//! at `warn` and yields 0, so the game keeps running.

use super::constants::SELF_OFFSET;
use super::errors::VmResult;
use crate::image::Image;
use crate::opcodes::search;
use log::{debug, warn};
use rustc_hash::FxHashMap;

/// Routines that can be intercepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VeneerRoutine {
    ZRegion,
    CpTab,
    OcCl,
    RaPr,
    RtChLdw,
    UnsignedCompare,
    RlPr,
    RvPr,
    OpPr,
    RtChStw,
    RtChLdb,
    MetaClass,
}

impl VeneerRoutine {
    /// Routine for a `SetVeneer` slot number
    pub fn from_slot(slot: u32) -> Option<Self> {
        Some(match slot {
            1 => VeneerRoutine::ZRegion,
            2 => VeneerRoutine::CpTab,
            3 => VeneerRoutine::OcCl,
            4 => VeneerRoutine::RaPr,
            5 => VeneerRoutine::RtChLdw,
            6 => VeneerRoutine::UnsignedCompare,
            7 => VeneerRoutine::RlPr,
            8 => VeneerRoutine::RvPr,
            9 => VeneerRoutine::OpPr,
            10 => VeneerRoutine::RtChStw,
            11 => VeneerRoutine::RtChLdb,
            12 => VeneerRoutine::MetaClass,
            _ => return None,
        })
    }

    /// Routine for an `accelfunc` function number. 8 to 13 are the revised
    /// forms of 2 to 7 and share their implementation here.
    pub fn from_accel(number: u32) -> Option<Self> {
        Some(match number {
            1 => VeneerRoutine::ZRegion,
            2 | 8 => VeneerRoutine::CpTab,
            3 | 9 => VeneerRoutine::RaPr,
            4 | 10 => VeneerRoutine::RlPr,
            5 | 11 => VeneerRoutine::OcCl,
            6 | 12 => VeneerRoutine::RvPr,
            7 | 13 => VeneerRoutine::OpPr,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            VeneerRoutine::ZRegion => "Z__Region",
            VeneerRoutine::CpTab => "CP__Tab",
            VeneerRoutine::OcCl => "OC__Cl",
            VeneerRoutine::RaPr => "RA__Pr",
            VeneerRoutine::RtChLdw => "RT__ChLDW",
            VeneerRoutine::UnsignedCompare => "Unsigned__Compare",
            VeneerRoutine::RlPr => "RL__Pr",
            VeneerRoutine::RvPr => "RV__Pr",
            VeneerRoutine::OpPr => "OP__Pr",
            VeneerRoutine::RtChStw => "RT__ChSTW",
            VeneerRoutine::RtChLdb => "RT__ChLDB",
            VeneerRoutine::MetaClass => "Meta__class",
        }
    }
}

/// `SetVeneer` slots that carry values rather than routine addresses
mod value_slot {
    pub const STRING: u32 = 1001;
    pub const ROUTINE: u32 = 1002;
    pub const CLASS: u32 = 1003;
    pub const OBJECT: u32 = 1004;
    pub const RT_ERR: u32 = 1005;
    pub const NUM_ATTR_BYTES: u32 = 1006;
    pub const CLASSES_TABLE: u32 = 1007;
    pub const INDIV_PROP_START: u32 = 1008;
    pub const CPV_START: u32 = 1009;
    pub const OFCLASS_ERR: u32 = 1010;
    pub const READPROP_ERR: u32 = 1011;
}

#[derive(Debug, Clone)]
pub struct Veneer {
    intercepts: FxHashMap<u32, VeneerRoutine>,
    pub string_metaclass: u32,
    pub routine_metaclass: u32,
    pub class_metaclass: u32,
    pub object_metaclass: u32,
    pub rt_err: u32,
    pub num_attr_bytes: u32,
    pub classes_table: u32,
    pub indiv_prop_start: u32,
    pub cpv_start: u32,
    pub ofclass_err: u32,
    pub readprop_err: u32,
    /// Address of the `self` global, if the game supplied one
    pub self_address: Option<u32>,
}

impl Default for Veneer {
    fn default() -> Self {
        Veneer {
            intercepts: FxHashMap::default(),
            string_metaclass: 0,
            routine_metaclass: 0,
            class_metaclass: 0,
            object_metaclass: 0,
            rt_err: 0,
            num_attr_bytes: 7,
            classes_table: 0,
            indiv_prop_start: 0,
            cpv_start: 0,
            ofclass_err: 0,
            readprop_err: 0,
            self_address: None,
        }
    }
}

impl Veneer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every intercept and value
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn intercept_count(&self) -> usize {
        self.intercepts.len()
    }

    /// Routine installed at `address`, if any
    pub fn intercept(&self, address: u32) -> Option<VeneerRoutine> {
        self.intercepts.get(&address).copied()
    }

    /// Handle fyrecall `SetVeneer`. Returns `false` for unknown slots.
    pub fn set_slot(&mut self, slot: u32, value: u32) -> bool {
        if let Some(routine) = VeneerRoutine::from_slot(slot) {
            debug!("veneer {} at {:#010x}", routine.name(), value);
            self.intercepts.insert(value, routine);
            return true;
        }
        let field = match slot {
            value_slot::STRING => &mut self.string_metaclass,
            value_slot::ROUTINE => &mut self.routine_metaclass,
            value_slot::CLASS => &mut self.class_metaclass,
            value_slot::OBJECT => &mut self.object_metaclass,
            value_slot::RT_ERR => &mut self.rt_err,
            value_slot::NUM_ATTR_BYTES => &mut self.num_attr_bytes,
            value_slot::CLASSES_TABLE => &mut self.classes_table,
            value_slot::INDIV_PROP_START => &mut self.indiv_prop_start,
            value_slot::CPV_START => &mut self.cpv_start,
            value_slot::OFCLASS_ERR => &mut self.ofclass_err,
            value_slot::READPROP_ERR => &mut self.readprop_err,
            _ => return false,
        };
        *field = value;
        true
    }

    /// Handle `accelfunc`: function 0 removes the intercept at `address`
    pub fn accel_func(&mut self, number: u32, address: u32) {
        if number == 0 {
            self.intercepts.remove(&address);
            return;
        }
        match VeneerRoutine::from_accel(number) {
            Some(routine) => {
                debug!("accelfunc {} ({}) at {:#010x}", number, routine.name(), address);
                self.intercepts.insert(address, routine);
            }
            None => debug!("accelfunc {} not supported", number),
        }
    }

    /// Handle `accelparam`
    pub fn accel_param(&mut self, index: u32, value: u32) {
        match index {
            0 => self.classes_table = value,
            1 => self.indiv_prop_start = value,
            2 => self.class_metaclass = value,
            3 => self.object_metaclass = value,
            4 => self.routine_metaclass = value,
            5 => self.string_metaclass = value,
            6 => self.self_address = Some(value),
            7 => self.num_attr_bytes = value,
            8 => self.cpv_start = value,
            _ => debug!("accelparam {} ignored", index),
        }
    }

    /// Run `routine` natively
    pub fn call(&self, routine: VeneerRoutine, image: &mut Image, args: &[u32]) -> VmResult<u32> {
        let arg = |i: usize| args.get(i).copied().unwrap_or(0);
        match routine {
            VeneerRoutine::ZRegion => self.z_region(image, arg(0)),
            VeneerRoutine::CpTab => self.cp_tab(image, arg(0), arg(1)),
            VeneerRoutine::OcCl => self.oc_cl(image, arg(0), arg(1)),
            VeneerRoutine::RaPr => self.ra_pr(image, arg(0), arg(1)),
            VeneerRoutine::RlPr => self.rl_pr(image, arg(0), arg(1)),
            VeneerRoutine::RvPr => self.rv_pr(image, arg(0), arg(1)),
            VeneerRoutine::OpPr => self.op_pr(image, arg(0), arg(1)),
            VeneerRoutine::MetaClass => self.meta_class(image, arg(0)),
            VeneerRoutine::UnsignedCompare => Ok(match arg(0).cmp(&arg(1)) {
                std::cmp::Ordering::Greater => 1,
                std::cmp::Ordering::Less => 0xFFFF_FFFF,
                std::cmp::Ordering::Equal => 0,
            }),
            VeneerRoutine::RtChLdw => {
                let address = arg(0).wrapping_add(arg(1).wrapping_mul(4));
                if address.checked_add(4).map_or(true, |end| end > image.end_mem()) {
                    warn!("[** Programming error: tried to read from word array outside memory at {:#x} **]", address);
                    return Ok(0);
                }
                image.read_u32(address)
            }
            VeneerRoutine::RtChLdb => {
                let address = arg(0).wrapping_add(arg(1));
                if address >= image.end_mem() {
                    warn!("[** Programming error: tried to read from byte array outside memory at {:#x} **]", address);
                    return Ok(0);
                }
                Ok(image.read_byte(address)? as u32)
            }
            VeneerRoutine::RtChStw => {
                let address = arg(0).wrapping_add(arg(1).wrapping_mul(4));
                let in_ram = address >= image.ram_start()
                    && address.checked_add(4).is_some_and(|end| end <= image.end_mem());
                if !in_ram {
                    warn!("[** Programming error: tried to write to word array outside RAM at {:#x} **]", address);
                    return Ok(0);
                }
                image.write_u32(address, arg(2))?;
                Ok(0)
            }
        }
    }

    fn z_region(&self, image: &Image, address: u32) -> VmResult<u32> {
        if address < 36 || address >= image.end_mem() {
            return Ok(0);
        }
        let tb = image.read_byte(address)?;
        Ok(if tb >= 0xE0 {
            3
        } else if tb >= 0xC0 {
            2
        } else if (0x70..=0x7F).contains(&tb) && address >= image.ram_start() {
            1
        } else {
            0
        })
    }

    fn obj_in_class(&self, image: &Image, obj: u32) -> VmResult<bool> {
        let parent = image.read_u32(obj.wrapping_add(13 + self.num_attr_bytes))?;
        Ok(parent == self.class_metaclass)
    }

    fn is_metaclass(&self, obj: u32) -> bool {
        obj == self.class_metaclass
            || obj == self.object_metaclass
            || obj == self.routine_metaclass
            || obj == self.string_metaclass
    }

    fn self_value(&self, image: &Image) -> VmResult<u32> {
        let address = self
            .self_address
            .unwrap_or_else(|| image.ram_start() + SELF_OFFSET);
        image.read_u32(address)
    }

    /// Address of the property table entry for `id`, or 0
    fn cp_tab(&self, image: &Image, obj: u32, id: u32) -> VmResult<u32> {
        if self.z_region(image, obj)? != 1 {
            warn!("[** Programming error: tried to find the property {} of {:#x} (not an object) **]", id, obj);
            return Ok(0);
        }
        let otab = image.read_u32(obj + 4 * (3 + self.num_attr_bytes / 4))?;
        if otab == 0 {
            return Ok(0);
        }
        let max = image.read_u32(otab)?;
        search::binary_search(image, id, 2, otab + 4, 10, max, 0, 0)
    }

    fn ra_pr(&self, image: &Image, mut obj: u32, mut id: u32) -> VmResult<u32> {
        let mut cla = 0;
        if id & 0xFFFF_0000 != 0 {
            cla = image.read_u32(self.classes_table.wrapping_add(4 * (id & 0xFFFF)))?;
            if self.oc_cl(image, obj, cla)? == 0 {
                return Ok(0);
            }
            id >>= 16;
            obj = cla;
        }

        let prop = self.cp_tab(image, obj, id)?;
        if prop == 0 {
            return Ok(0);
        }
        if self.obj_in_class(image, obj)?
            && cla == 0
            && (id < self.indiv_prop_start || id >= self.indiv_prop_start + 8)
        {
            return Ok(0);
        }
        if self.self_value(image)? != obj && image.read_byte(prop + 9)? & 1 != 0 {
            return Ok(0);
        }
        image.read_u32(prop + 4)
    }

    fn rl_pr(&self, image: &Image, mut obj: u32, mut id: u32) -> VmResult<u32> {
        let mut cla = 0;
        if id & 0xFFFF_0000 != 0 {
            cla = image.read_u32(self.classes_table.wrapping_add(4 * (id & 0xFFFF)))?;
            if self.oc_cl(image, obj, cla)? == 0 {
                return Ok(0);
            }
            id >>= 16;
            obj = cla;
        }

        let prop = self.cp_tab(image, obj, id)?;
        if prop == 0 {
            return Ok(0);
        }
        if self.obj_in_class(image, obj)?
            && cla == 0
            && (id < self.indiv_prop_start || id >= self.indiv_prop_start + 8)
        {
            return Ok(0);
        }
        if self.self_value(image)? != obj && image.read_byte(prop + 9)? & 1 != 0 {
            return Ok(0);
        }
        Ok(image.read_u16(prop + 2)? as u32 * 4)
    }

    fn rv_pr(&self, image: &Image, obj: u32, id: u32) -> VmResult<u32> {
        let address = self.ra_pr(image, obj, id)?;
        if address == 0 {
            if id > 0 && id < self.indiv_prop_start {
                return image.read_u32(self.cpv_start.wrapping_add(4 * id));
            }
            warn!("[** Programming error: tried to read property {} of {:#x}, which has none **]", id, obj);
            return Ok(0);
        }
        image.read_u32(address)
    }

    fn op_pr(&self, image: &Image, obj: u32, id: u32) -> VmResult<u32> {
        let ips = self.indiv_prop_start;
        match self.z_region(image, obj)? {
            // print, print_to_array
            3 => return Ok((id == ips + 6 || id == ips + 7) as u32),
            // call
            2 => return Ok((id == ips + 5) as u32),
            1 => {}
            _ => return Ok(0),
        }
        if id >= ips && id < ips + 8 && self.obj_in_class(image, obj)? {
            return Ok(1);
        }
        Ok((self.ra_pr(image, obj, id)? != 0) as u32)
    }

    fn oc_cl(&self, image: &Image, obj: u32, cla: u32) -> VmResult<u32> {
        match self.z_region(image, obj)? {
            3 => return Ok((cla == self.string_metaclass) as u32),
            2 => return Ok((cla == self.routine_metaclass) as u32),
            1 => {}
            _ => return Ok(0),
        }

        if cla == self.class_metaclass {
            let is_class = self.obj_in_class(image, obj)? || self.is_metaclass(obj);
            return Ok(is_class as u32);
        }
        if cla == self.object_metaclass {
            let is_class = self.obj_in_class(image, obj)? || self.is_metaclass(obj);
            return Ok((!is_class) as u32);
        }
        if cla == self.string_metaclass || cla == self.routine_metaclass {
            return Ok(0);
        }
        if !self.obj_in_class(image, cla)? {
            warn!("[** Programming error: tried to apply 'ofclass' with non-class {:#x} **]", cla);
            return Ok(0);
        }

        let inlist = self.ra_pr(image, obj, 2)?;
        if inlist == 0 {
            return Ok(0);
        }
        let len = self.rl_pr(image, obj, 2)? / 4;
        for i in 0..len {
            if image.read_u32(inlist + 4 * i)? == cla {
                return Ok(1);
            }
        }
        Ok(0)
    }

    fn meta_class(&self, image: &Image, obj: u32) -> VmResult<u32> {
        Ok(match self.z_region(image, obj)? {
            2 => self.routine_metaclass,
            3 => self.string_metaclass,
            1 if self.obj_in_class(image, obj)? || self.is_metaclass(obj) => self.class_metaclass,
            1 => self.object_metaclass,
            _ => 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::MAGIC;

    const OBJ: u32 = 0x200;
    const CLASS_OBJ: u32 = 0x240;
    const CLASS_MC: u32 = 0x280;
    const PROPS: u32 = 0x300;

    fn put(bytes: &mut [u8], at: u32, value: u32) {
        bytes[at as usize..at as usize + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// One object at 0x200 with property 5 (value 0xBEEF) and property 2
    /// listing CLASS_OBJ, so OBJ ofclass CLASS_OBJ
    fn world() -> (Veneer, Image) {
        let mut bytes = vec![0u8; 0x400];
        let fields = [MAGIC, 0x0003_0102, 0x100, 0x400, 0x400, 0x100, 0x40, 0, 0];
        for (i, f) in fields.iter().enumerate() {
            put(&mut bytes, i as u32 * 4, *f);
        }
        bytes[0x80] = 0xC1; // a routine
        bytes[0x90] = 0xE0; // a string

        for obj in [OBJ, CLASS_OBJ, CLASS_MC] {
            bytes[obj as usize] = 0x70;
        }
        put(&mut bytes, OBJ + 16, PROPS);
        put(&mut bytes, CLASS_OBJ + 20, CLASS_MC); // parent is Class

        // property table: count, then (id:2, len:2, addr:4, flags:2)
        put(&mut bytes, PROPS, 2);
        let entries = [(2u16, 1u16, 0x360u32), (5, 1, 0x340)];
        for (i, (id, len, addr)) in entries.iter().enumerate() {
            let at = (PROPS + 4 + 10 * i as u32) as usize;
            bytes[at..at + 2].copy_from_slice(&id.to_be_bytes());
            bytes[at + 2..at + 4].copy_from_slice(&len.to_be_bytes());
            bytes[at + 4..at + 8].copy_from_slice(&addr.to_be_bytes());
        }
        put(&mut bytes, 0x340, 0xBEEF);
        put(&mut bytes, 0x360, CLASS_OBJ);

        let mut veneer = Veneer::new();
        veneer.class_metaclass = CLASS_MC;
        veneer.object_metaclass = 0x2C0;
        veneer.routine_metaclass = 0x2D0;
        veneer.string_metaclass = 0x2E0;
        veneer.indiv_prop_start = 0x100;
        (veneer, Image::new(bytes, 0x10000).unwrap())
    }

    #[test]
    fn test_z_region() {
        let (veneer, mut image) = world();
        let mut region = |a| veneer.call(VeneerRoutine::ZRegion, &mut image, &[a]).unwrap();
        assert_eq!(region(OBJ), 1);
        assert_eq!(region(0x80), 2);
        assert_eq!(region(0x90), 3);
        assert_eq!(region(0x10), 0);
        assert_eq!(region(0x5000), 0);
    }

    #[test]
    fn test_property_lookup() {
        let (veneer, mut image) = world();
        assert_eq!(
            veneer.call(VeneerRoutine::RaPr, &mut image, &[OBJ, 5]).unwrap(),
            0x340
        );
        assert_eq!(
            veneer.call(VeneerRoutine::RvPr, &mut image, &[OBJ, 5]).unwrap(),
            0xBEEF
        );
        assert_eq!(
            veneer.call(VeneerRoutine::RlPr, &mut image, &[OBJ, 5]).unwrap(),
            4
        );
        assert_eq!(
            veneer.call(VeneerRoutine::OpPr, &mut image, &[OBJ, 5]).unwrap(),
            1
        );
        assert_eq!(
            veneer.call(VeneerRoutine::OpPr, &mut image, &[OBJ, 6]).unwrap(),
            0
        );
    }

    #[test]
    fn test_misuse_is_lenient() {
        let (veneer, mut image) = world();
        // property of a routine: logged, yields 0
        assert_eq!(
            veneer.call(VeneerRoutine::RvPr, &mut image, &[0x80, 9]).unwrap(),
            0
        );
        assert_eq!(
            veneer.call(VeneerRoutine::CpTab, &mut image, &[0x10, 5]).unwrap(),
            0
        );
    }

    #[test]
    fn test_ofclass_and_metaclass() {
        let (veneer, mut image) = world();
        let mut call = |r, args: &[u32]| veneer.call(r, &mut image, args).unwrap();
        assert_eq!(call(VeneerRoutine::OcCl, &[OBJ, CLASS_OBJ]), 1);
        assert_eq!(call(VeneerRoutine::OcCl, &[OBJ, 0x2C0]), 1);
        assert_eq!(call(VeneerRoutine::OcCl, &[CLASS_OBJ, CLASS_MC]), 1);
        assert_eq!(call(VeneerRoutine::OcCl, &[0x80, 0x2D0]), 1);
        // OBJ is not a class, so this is misuse
        assert_eq!(call(VeneerRoutine::OcCl, &[CLASS_OBJ, OBJ]), 0);
        assert_eq!(call(VeneerRoutine::MetaClass, &[OBJ]), 0x2C0);
        assert_eq!(call(VeneerRoutine::MetaClass, &[CLASS_OBJ]), CLASS_MC);
        assert_eq!(call(VeneerRoutine::MetaClass, &[0x90]), 0x2E0);
    }

    #[test]
    fn test_checked_array_access() {
        let (veneer, mut image) = world();
        assert_eq!(
            veneer
                .call(VeneerRoutine::RtChStw, &mut image, &[0x380, 1, 77])
                .unwrap(),
            0
        );
        assert_eq!(image.read_u32(0x384).unwrap(), 77);
        assert_eq!(
            veneer.call(VeneerRoutine::RtChLdw, &mut image, &[0x380, 1]).unwrap(),
            77
        );
        assert_eq!(
            veneer.call(VeneerRoutine::RtChLdw, &mut image, &[0x3FC, 1]).unwrap(),
            0
        );
        // ROM writes are refused, not fatal
        veneer
            .call(VeneerRoutine::RtChStw, &mut image, &[0x40, 0, 1])
            .unwrap();
        assert_eq!(
            veneer
                .call(VeneerRoutine::UnsignedCompare, &mut image, &[1, 0xFFFF_FFFF])
                .unwrap(),
            0xFFFF_FFFF
        );
    }

    #[test]
    fn test_slots_and_accel() {
        let mut veneer = Veneer::new();
        assert!(veneer.set_slot(8, 0x1234));
        assert_eq!(veneer.intercept(0x1234), Some(VeneerRoutine::RvPr));
        assert!(veneer.set_slot(1006, 11));
        assert_eq!(veneer.num_attr_bytes, 11);
        assert!(!veneer.set_slot(99, 0));

        veneer.accel_func(12, 0x2000);
        assert_eq!(veneer.intercept(0x2000), Some(VeneerRoutine::RvPr));
        veneer.accel_func(0, 0x2000);
        assert_eq!(veneer.intercept(0x2000), None);
        veneer.accel_param(6, 0x150);
        assert_eq!(veneer.self_address, Some(0x150));
    }
}
