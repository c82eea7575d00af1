//! An in-memory host for exercising replay.
//!
//! Every mutation appends a rendered call to `ops`, so tests assert on
//! the exact sequence of host calls an event produces. Failure injection
//! and an echo hook cover the fault-isolation and feedback-loop paths.

use std::collections::BTreeMap;

use idbsync_core::host::{
    ByteOps, DecompilerOps, FunctionOps, RefreshTarget, SegmentOps, TypeOps, ViewOps,
};
use idbsync_core::local_types::{TypeCatalogue, TypeRecord};
use idbsync_core::payloads::{
    CitemLocator, LvarSettings, MemberExtra, NumberFormat, OperandLocator, OperandRepr,
    SegmentDef, SregRange, TreeLoc,
};
use idbsync_core::{Ea, HostError, RawData};

/// Callback fired after every successful mutation, with the op name.
///
/// Used to simulate the host's own notification hooks firing back into
/// the capture layer mid-replay.
pub type MutationHook = Box<dyn FnMut(&str)>;

#[derive(Default)]
pub struct MockHost {
    /// Rendered mutation calls, in order.
    pub ops: Vec<String>,
    /// Op names that fail with a `HostError` instead of applying.
    pub fail_on: Vec<String>,
    /// Fired after each successful mutation.
    pub on_mutation: Option<MutationHook>,

    /// View refreshes requested so far.
    pub refreshes: Vec<RefreshTarget>,
    /// Decompiler panes refreshed so far.
    pub decompiler_refreshes: Vec<Ea>,

    pub names: BTreeMap<Ea, String>,
    pub comments: BTreeMap<Ea, String>,
    pub catalogue: TypeCatalogue,
    pub sreg: BTreeMap<u16, Vec<SregRange>>,
    pub members: BTreeMap<String, Ea>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named op fail until cleared.
    pub fn fail_on(&mut self, op: &str) {
        self.fail_on.push(op.to_string());
    }

    fn op(&mut self, name: &'static str, call: String) -> Result<(), HostError> {
        if self.fail_on.iter().any(|f| f == name) {
            return Err(HostError::new(format!("{name} rejected")));
        }
        self.ops.push(call);
        if let Some(hook) = self.on_mutation.as_mut() {
            hook(name);
        }
        Ok(())
    }

    fn next_ordinal(&self) -> u32 {
        self.catalogue.iter().map(|(o, _)| o).max().unwrap_or(0) + 1
    }

    fn ordinal_of(&self, name: &str) -> Option<u32> {
        self.catalogue
            .iter()
            .find(|(_, r)| r.name == name)
            .map(|(o, _)| o)
    }
}

impl ByteOps for MockHost {
    fn make_code(&mut self, ea: Ea) -> Result<(), HostError> {
        self.op("make_code", format!("make_code({ea})"))
    }

    fn make_data(
        &mut self,
        ea: Ea,
        flags: u32,
        size: u64,
        sname: Option<&str>,
    ) -> Result<(), HostError> {
        let sname = sname.unwrap_or("");
        self.op(
            "make_data",
            format!("make_data({ea}, {flags:#x}, {size}, {sname:?})"),
        )
    }

    fn del_items(&mut self, ea: Ea, expand: bool) -> Result<(), HostError> {
        self.op("del_items", format!("del_items({ea}, {expand})"))
    }

    fn patch_byte(&mut self, ea: Ea, value: u8) -> Result<(), HostError> {
        self.op("patch_byte", format!("patch_byte({ea}, {value:#04x})"))
    }

    fn set_name(&mut self, ea: Ea, name: &str, local: bool) -> Result<(), HostError> {
        self.op("set_name", format!("set_name({ea}, {name:?}, {local})"))?;
        self.names.insert(ea, name.to_string());
        Ok(())
    }

    fn set_cmt(&mut self, ea: Ea, comment: &str, repeatable: bool) -> Result<(), HostError> {
        self.op("set_cmt", format!("set_cmt({ea}, {comment:?}, {repeatable})"))?;
        self.comments.insert(ea, comment.to_string());
        Ok(())
    }

    fn del_extra_cmt(&mut self, ea: Ea, line_idx: i32) -> Result<(), HostError> {
        self.op("del_extra_cmt", format!("del_extra_cmt({ea}, {line_idx})"))
    }

    fn add_extra_cmt(&mut self, ea: Ea, isprev: bool, cmt: &str) -> Result<(), HostError> {
        self.op(
            "add_extra_cmt",
            format!("add_extra_cmt({ea}, {isprev}, {cmt:?})"),
        )
    }

    fn set_operand_repr(&mut self, ea: Ea, n: u8, repr: &OperandRepr) -> Result<(), HostError> {
        self.op(
            "set_operand_repr",
            format!("set_operand_repr({ea}, {n}, {repr:?})"),
        )
    }

    fn put_bookmark(&mut self, ea: Ea, pos: u64, comment: &str) -> Result<(), HostError> {
        self.op(
            "put_bookmark",
            format!("put_bookmark({ea}, {pos}, {comment:?})"),
        )
    }

    fn apply_type(
        &mut self,
        ea: Ea,
        type_blob: &[u8],
        _fields: &RawData,
    ) -> Result<(), HostError> {
        self.op(
            "apply_type",
            format!("apply_type({ea}, {} bytes)", type_blob.len()),
        )
    }
}

impl FunctionOps for MockHost {
    fn add_func(&mut self, start_ea: Ea, end_ea: Ea) -> Result<(), HostError> {
        self.op("add_func", format!("add_func({start_ea}, {end_ea})"))
    }

    fn del_func(&mut self, ea: Ea) -> Result<(), HostError> {
        self.op("del_func", format!("del_func({ea})"))
    }

    fn set_func_start(&mut self, ea: Ea, new_start: Ea) -> Result<(), HostError> {
        self.op("set_func_start", format!("set_func_start({ea}, {new_start})"))
    }

    fn set_func_end(&mut self, ea: Ea, new_end: Ea) -> Result<(), HostError> {
        self.op("set_func_end", format!("set_func_end({ea}, {new_end})"))
    }

    fn append_func_tail(
        &mut self,
        func_ea: Ea,
        start_ea: Ea,
        end_ea: Ea,
    ) -> Result<(), HostError> {
        self.op(
            "append_func_tail",
            format!("append_func_tail({func_ea}, {start_ea}, {end_ea})"),
        )
    }

    fn remove_func_tail(&mut self, func_ea: Ea, tail_ea: Ea) -> Result<(), HostError> {
        self.op(
            "remove_func_tail",
            format!("remove_func_tail({func_ea}, {tail_ea})"),
        )
    }

    fn set_tail_owner(&mut self, tail_ea: Ea, owner_ea: Ea) -> Result<(), HostError> {
        self.op(
            "set_tail_owner",
            format!("set_tail_owner({tail_ea}, {owner_ea})"),
        )
    }

    fn set_func_cmt(&mut self, ea: Ea, comment: &str, repeatable: bool) -> Result<(), HostError> {
        self.op(
            "set_func_cmt",
            format!("set_func_cmt({ea}, {comment:?}, {repeatable})"),
        )
    }
}

impl SegmentOps for MockHost {
    fn add_segment(&mut self, def: &SegmentDef) -> Result<(), HostError> {
        self.op(
            "add_segment",
            format!("add_segment({:?}, {}, {})", def.name, def.start_ea, def.end_ea),
        )
    }

    fn del_segment(&mut self, ea: Ea, flags: u16) -> Result<(), HostError> {
        self.op("del_segment", format!("del_segment({ea}, {flags:#x})"))
    }

    fn set_segment_start(&mut self, ea: Ea, new_start: Ea) -> Result<(), HostError> {
        self.op(
            "set_segment_start",
            format!("set_segment_start({ea}, {new_start})"),
        )
    }

    fn set_segment_end(&mut self, ea: Ea, new_end: Ea) -> Result<(), HostError> {
        self.op(
            "set_segment_end",
            format!("set_segment_end({ea}, {new_end})"),
        )
    }

    fn set_segment_name(&mut self, ea: Ea, name: &str) -> Result<(), HostError> {
        self.op(
            "set_segment_name",
            format!("set_segment_name({ea}, {name:?})"),
        )
    }

    fn set_segment_class(&mut self, ea: Ea, class: &str) -> Result<(), HostError> {
        self.op(
            "set_segment_class",
            format!("set_segment_class({ea}, {class:?})"),
        )
    }

    fn set_segment_attrs(&mut self, ea: Ea, perm: u8, bitness: u8) -> Result<(), HostError> {
        self.op(
            "set_segment_attrs",
            format!("set_segment_attrs({ea}, {perm}, {bitness})"),
        )
    }

    fn move_segment(&mut self, from: Ea, to: Ea, changed_netmap: bool) -> Result<(), HostError> {
        self.op(
            "move_segment",
            format!("move_segment({from}, {to}, {changed_netmap})"),
        )
    }

    fn set_segment_cmt(&mut self, ea: Ea, comment: &str, repeatable: bool)
        -> Result<(), HostError> {
        self.op(
            "set_segment_cmt",
            format!("set_segment_cmt({ea}, {comment:?}, {repeatable})"),
        )
    }

    fn sreg_ranges(&self, reg: u16) -> Result<Vec<SregRange>, HostError> {
        Ok(self.sreg.get(&reg).cloned().unwrap_or_default())
    }

    fn split_sreg_range(
        &mut self,
        ea: Ea,
        reg: u16,
        value: u64,
        tag: u8,
    ) -> Result<(), HostError> {
        self.op(
            "split_sreg_range",
            format!("split_sreg_range({ea}, {reg}, {value}, {tag})"),
        )
    }

    fn del_sreg_range(&mut self, ea: Ea, reg: u16) -> Result<(), HostError> {
        self.op("del_sreg_range", format!("del_sreg_range({ea}, {reg})"))
    }
}

impl TypeOps for MockHost {
    fn add_enum(&mut self, name: &str) -> Result<(), HostError> {
        self.op("add_enum", format!("add_enum({name:?})"))
    }

    fn del_enum(&mut self, ename: &str) -> Result<(), HostError> {
        self.op("del_enum", format!("del_enum({ename:?})"))
    }

    fn rename_enum(&mut self, oldname: &str, newname: &str) -> Result<(), HostError> {
        self.op("rename_enum", format!("rename_enum({oldname:?}, {newname:?})"))
    }

    fn rename_enum_member(&mut self, oldname: &str, newname: &str) -> Result<(), HostError> {
        self.op(
            "rename_enum_member",
            format!("rename_enum_member({oldname:?}, {newname:?})"),
        )
    }

    fn set_enum_bf(&mut self, ename: &str, bf: bool) -> Result<(), HostError> {
        self.op("set_enum_bf", format!("set_enum_bf({ename:?}, {bf})"))
    }

    fn set_enum_cmt(&mut self, emname: &str, cmt: &str, repeatable: bool)
        -> Result<(), HostError> {
        self.op(
            "set_enum_cmt",
            format!("set_enum_cmt({emname:?}, {cmt:?}, {repeatable})"),
        )
    }

    fn add_enum_member(
        &mut self,
        ename: &str,
        name: &str,
        value: u64,
        bmask: u64,
    ) -> Result<(), HostError> {
        self.op(
            "add_enum_member",
            format!("add_enum_member({ename:?}, {name:?}, {value:#x}, {bmask:#x})"),
        )
    }

    fn del_enum_member(
        &mut self,
        ename: &str,
        value: u64,
        serial: u8,
        bmask: u64,
    ) -> Result<(), HostError> {
        self.op(
            "del_enum_member",
            format!("del_enum_member({ename:?}, {value:#x}, {serial}, {bmask:#x})"),
        )
    }

    fn add_struc(&mut self, name: &str, is_union: bool) -> Result<(), HostError> {
        self.op("add_struc", format!("add_struc({name:?}, {is_union})"))
    }

    fn del_struc(&mut self, sname: &str) -> Result<(), HostError> {
        self.op("del_struc", format!("del_struc({sname:?})"))
    }

    fn rename_struc(&mut self, oldname: &str, newname: &str) -> Result<(), HostError> {
        self.op(
            "rename_struc",
            format!("rename_struc({oldname:?}, {newname:?})"),
        )
    }

    fn set_struc_cmt(&mut self, sname: &str, cmt: &str, repeatable: bool)
        -> Result<(), HostError> {
        self.op(
            "set_struc_cmt",
            format!("set_struc_cmt({sname:?}, {cmt:?}, {repeatable})"),
        )
    }

    fn set_struc_member_cmt(
        &mut self,
        sname: &str,
        smname: &str,
        cmt: &str,
        repeatable: bool,
    ) -> Result<(), HostError> {
        self.op(
            "set_struc_member_cmt",
            format!("set_struc_member_cmt({sname:?}, {smname:?}, {cmt:?}, {repeatable})"),
        )
    }

    fn expand_struc(&mut self, sname: &str, offset: u64, delta: i64) -> Result<(), HostError> {
        self.op(
            "expand_struc",
            format!("expand_struc({sname:?}, {offset:#x}, {delta})"),
        )
    }

    fn add_struc_member(
        &mut self,
        sname: &str,
        fieldname: &str,
        offset: u64,
        flag: u32,
        nbytes: u64,
        extra: &MemberExtra,
    ) -> Result<(), HostError> {
        self.op(
            "add_struc_member",
            format!(
                "add_struc_member({sname:?}, {fieldname:?}, {offset:#x}, {flag:#x}, {nbytes}, {extra:?})"
            ),
        )
    }

    fn change_struc_member(
        &mut self,
        sname: &str,
        offset: u64,
        flag: u32,
        nbytes: u64,
        extra: &MemberExtra,
    ) -> Result<(), HostError> {
        self.op(
            "change_struc_member",
            format!(
                "change_struc_member({sname:?}, {offset:#x}, {flag:#x}, {nbytes}, {extra:?})"
            ),
        )
    }

    fn del_struc_member(&mut self, sname: &str, offset: u64) -> Result<(), HostError> {
        self.op(
            "del_struc_member",
            format!("del_struc_member({sname:?}, {offset:#x})"),
        )
    }

    fn rename_struc_member(
        &mut self,
        sname: &str,
        offset: u64,
        newname: &str,
    ) -> Result<(), HostError> {
        self.op(
            "rename_struc_member",
            format!("rename_struc_member({sname:?}, {offset:#x}, {newname:?})"),
        )
    }

    fn insert_local_type(&mut self, record: &TypeRecord) -> Result<(), HostError> {
        self.op(
            "insert_local_type",
            format!("insert_local_type({:?})", record.name),
        )?;
        let ordinal = self
            .ordinal_of(&record.name)
            .unwrap_or_else(|| self.next_ordinal());
        self.catalogue.insert(ordinal, record.clone());
        Ok(())
    }

    fn edit_local_type(&mut self, old_name: &str, record: &TypeRecord)
        -> Result<(), HostError> {
        self.op(
            "edit_local_type",
            format!("edit_local_type({old_name:?} -> {:?})", record.name),
        )?;
        let ordinal = self
            .ordinal_of(old_name)
            .unwrap_or_else(|| self.next_ordinal());
        self.catalogue.insert(ordinal, record.clone());
        Ok(())
    }

    fn delete_local_type(&mut self, name: &str) -> Result<(), HostError> {
        self.op("delete_local_type", format!("delete_local_type({name:?})"))?;
        if let Some(ordinal) = self.ordinal_of(name) {
            self.catalogue.remove(ordinal);
        }
        Ok(())
    }

    fn read_type_catalogue(&self) -> Result<TypeCatalogue, HostError> {
        Ok(self.catalogue.clone())
    }

    fn local_type_ordinal(&self, name: &str) -> Option<u32> {
        self.ordinal_of(name)
    }

    fn member_id_by_fullname(&self, fullname: &str) -> Option<Ea> {
        self.members.get(fullname).copied()
    }
}

impl DecompilerOps for MockHost {
    fn save_user_labels(&mut self, ea: Ea, labels: &[(i32, String)]) -> Result<(), HostError> {
        self.op(
            "save_user_labels",
            format!("save_user_labels({ea}, {} labels)", labels.len()),
        )
    }

    fn save_user_cmts(&mut self, ea: Ea, cmts: &[(TreeLoc, String)]) -> Result<(), HostError> {
        self.op(
            "save_user_cmts",
            format!("save_user_cmts({ea}, {} cmts)", cmts.len()),
        )
    }

    fn save_user_iflags(
        &mut self,
        ea: Ea,
        iflags: &[(CitemLocator, i32)],
    ) -> Result<(), HostError> {
        self.op(
            "save_user_iflags",
            format!("save_user_iflags({ea}, {} iflags)", iflags.len()),
        )
    }

    fn save_user_lvar_settings(
        &mut self,
        ea: Ea,
        settings: &LvarSettings,
    ) -> Result<(), HostError> {
        self.op(
            "save_user_lvar_settings",
            format!("save_user_lvar_settings({ea}, {} lvars)", settings.lvvec.len()),
        )
    }

    fn save_user_numforms(
        &mut self,
        ea: Ea,
        numforms: &[(OperandLocator, NumberFormat)],
    ) -> Result<(), HostError> {
        self.op(
            "save_user_numforms",
            format!("save_user_numforms({ea}, {} numforms)", numforms.len()),
        )
    }
}

impl ViewOps for MockHost {
    fn request_refresh(&mut self, target: RefreshTarget) {
        self.refreshes.push(target);
    }

    fn refresh_decompiler_view(&mut self, ea: Ea) {
        self.decompiler_refreshes.push(ea);
    }
}
