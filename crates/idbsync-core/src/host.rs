//! Capability traits through which the sync core drives the host
//! analysis engine.
//!
//! The core never talks to the host API directly. Each mutation category
//! gets its own trait so that replay code states exactly which capabilities
//! it needs, and so that the testkit can observe every call. All mutation
//! methods return `Result<(), HostError>`; a failure aborts the current
//! event only, never the batch.
//!
//! The core calls the host from a single cooperative thread and never
//! re-enters it.

use crate::error::HostError;
use crate::local_types::{TypeCatalogue, TypeRecord};
use crate::payloads::{
    CitemLocator, LvarSettings, MemberExtra, NumberFormat, OperandLocator, OperandRepr,
    SegmentDef, SregRange, TreeLoc,
};
use crate::types::{Ea, RawData};

/// A view or pane the host should repaint after a replayed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTarget {
    /// Disassembly listing views.
    Listing,
    /// The stack frame view.
    StackView,
    /// The segments window.
    Segments,
    /// The segment registers window.
    SegRegs,
    /// The local types window.
    LocalTypes,
}

/// Byte-level and address-level mutations.
pub trait ByteOps {
    fn make_code(&mut self, ea: Ea) -> Result<(), HostError>;

    /// Define a data item; `sname` names the struct type for struct items.
    fn make_data(
        &mut self,
        ea: Ea,
        flags: u32,
        size: u64,
        sname: Option<&str>,
    ) -> Result<(), HostError>;

    /// Undefine items starting at `ea`; `expand` widens the range to whole
    /// items.
    fn del_items(&mut self, ea: Ea, expand: bool) -> Result<(), HostError>;

    fn patch_byte(&mut self, ea: Ea, value: u8) -> Result<(), HostError>;

    fn set_name(&mut self, ea: Ea, name: &str, local: bool) -> Result<(), HostError>;

    fn set_cmt(&mut self, ea: Ea, comment: &str, repeatable: bool) -> Result<(), HostError>;

    fn del_extra_cmt(&mut self, ea: Ea, line_idx: i32) -> Result<(), HostError>;
    fn add_extra_cmt(&mut self, ea: Ea, isprev: bool, cmt: &str) -> Result<(), HostError>;

    fn set_operand_repr(&mut self, ea: Ea, n: u8, repr: &OperandRepr) -> Result<(), HostError>;

    /// Create or update the bookmark at slot `pos`; an empty comment clears
    /// the slot.
    fn put_bookmark(&mut self, ea: Ea, pos: u64, comment: &str) -> Result<(), HostError>;

    /// Apply serialized type info to an address or member id.
    fn apply_type(&mut self, ea: Ea, type_blob: &[u8], fields: &RawData)
        -> Result<(), HostError>;
}

/// Function-table mutations.
pub trait FunctionOps {
    fn add_func(&mut self, start_ea: Ea, end_ea: Ea) -> Result<(), HostError>;
    fn del_func(&mut self, ea: Ea) -> Result<(), HostError>;
    fn set_func_start(&mut self, ea: Ea, new_start: Ea) -> Result<(), HostError>;
    fn set_func_end(&mut self, ea: Ea, new_end: Ea) -> Result<(), HostError>;
    fn append_func_tail(&mut self, func_ea: Ea, start_ea: Ea, end_ea: Ea)
        -> Result<(), HostError>;
    fn remove_func_tail(&mut self, func_ea: Ea, tail_ea: Ea) -> Result<(), HostError>;
    fn set_tail_owner(&mut self, tail_ea: Ea, owner_ea: Ea) -> Result<(), HostError>;
    fn set_func_cmt(&mut self, ea: Ea, comment: &str, repeatable: bool) -> Result<(), HostError>;
}

/// Segment-table mutations, including segment registers.
pub trait SegmentOps {
    fn add_segment(&mut self, def: &SegmentDef) -> Result<(), HostError>;

    /// Delete the segment at `ea`. The host removes it silently regardless
    /// of `flags`.
    fn del_segment(&mut self, ea: Ea, flags: u16) -> Result<(), HostError>;

    fn set_segment_start(&mut self, ea: Ea, new_start: Ea) -> Result<(), HostError>;
    fn set_segment_end(&mut self, ea: Ea, new_end: Ea) -> Result<(), HostError>;
    fn set_segment_name(&mut self, ea: Ea, name: &str) -> Result<(), HostError>;
    fn set_segment_class(&mut self, ea: Ea, class: &str) -> Result<(), HostError>;
    fn set_segment_attrs(&mut self, ea: Ea, perm: u8, bitness: u8) -> Result<(), HostError>;

    /// Move the segment at `from` to `to`. `changed_netmap` tells the host
    /// whether address-keyed storage already follows the move.
    fn move_segment(&mut self, from: Ea, to: Ea, changed_netmap: bool) -> Result<(), HostError>;

    fn set_segment_cmt(&mut self, ea: Ea, comment: &str, repeatable: bool)
        -> Result<(), HostError>;

    /// Current ranges of the given segment register.
    fn sreg_ranges(&self, reg: u16) -> Result<Vec<SregRange>, HostError>;
    fn split_sreg_range(&mut self, ea: Ea, reg: u16, value: u64, tag: u8)
        -> Result<(), HostError>;
    fn del_sreg_range(&mut self, ea: Ea, reg: u16) -> Result<(), HostError>;
}

/// Struct, enum, and local-type mutations.
///
/// Structs, enums, and local types are addressed by name: numeric ids and
/// ordinals are private to each database copy and never travel.
pub trait TypeOps {
    fn add_enum(&mut self, name: &str) -> Result<(), HostError>;
    fn del_enum(&mut self, ename: &str) -> Result<(), HostError>;
    fn rename_enum(&mut self, oldname: &str, newname: &str) -> Result<(), HostError>;
    fn rename_enum_member(&mut self, oldname: &str, newname: &str) -> Result<(), HostError>;
    fn set_enum_bf(&mut self, ename: &str, bf: bool) -> Result<(), HostError>;

    /// Set the comment on the enum member with the given name.
    fn set_enum_cmt(&mut self, emname: &str, cmt: &str, repeatable: bool)
        -> Result<(), HostError>;

    fn add_enum_member(
        &mut self,
        ename: &str,
        name: &str,
        value: u64,
        bmask: u64,
    ) -> Result<(), HostError>;
    fn del_enum_member(
        &mut self,
        ename: &str,
        value: u64,
        serial: u8,
        bmask: u64,
    ) -> Result<(), HostError>;

    fn add_struc(&mut self, name: &str, is_union: bool) -> Result<(), HostError>;
    fn del_struc(&mut self, sname: &str) -> Result<(), HostError>;
    fn rename_struc(&mut self, oldname: &str, newname: &str) -> Result<(), HostError>;
    fn set_struc_cmt(&mut self, sname: &str, cmt: &str, repeatable: bool)
        -> Result<(), HostError>;
    fn set_struc_member_cmt(
        &mut self,
        sname: &str,
        smname: &str,
        cmt: &str,
        repeatable: bool,
    ) -> Result<(), HostError>;
    fn expand_struc(&mut self, sname: &str, offset: u64, delta: i64) -> Result<(), HostError>;

    fn add_struc_member(
        &mut self,
        sname: &str,
        fieldname: &str,
        offset: u64,
        flag: u32,
        nbytes: u64,
        extra: &MemberExtra,
    ) -> Result<(), HostError>;
    fn change_struc_member(
        &mut self,
        sname: &str,
        offset: u64,
        flag: u32,
        nbytes: u64,
        extra: &MemberExtra,
    ) -> Result<(), HostError>;
    fn del_struc_member(&mut self, sname: &str, offset: u64) -> Result<(), HostError>;
    fn rename_struc_member(
        &mut self,
        sname: &str,
        offset: u64,
        newname: &str,
    ) -> Result<(), HostError>;

    /// Insert a local type under its name, replacing any existing one.
    fn insert_local_type(&mut self, record: &TypeRecord) -> Result<(), HostError>;

    /// Re-define the local type currently named `old_name` in place,
    /// preserving its ordinal so that references keep resolving.
    fn edit_local_type(&mut self, old_name: &str, record: &TypeRecord)
        -> Result<(), HostError>;

    fn delete_local_type(&mut self, name: &str) -> Result<(), HostError>;

    /// Snapshot the entire local type catalogue.
    fn read_type_catalogue(&self) -> Result<TypeCatalogue, HostError>;

    /// This side's ordinal for a named local type, if any.
    fn local_type_ordinal(&self, name: &str) -> Option<u32>;

    /// Resolve a `Struct.member` full name to the member's id address.
    fn member_id_by_fullname(&self, fullname: &str) -> Option<Ea>;
}

/// Persisted decompiler-side user data.
pub trait DecompilerOps {
    fn save_user_labels(&mut self, ea: Ea, labels: &[(i32, String)]) -> Result<(), HostError>;
    fn save_user_cmts(&mut self, ea: Ea, cmts: &[(TreeLoc, String)]) -> Result<(), HostError>;
    fn save_user_iflags(&mut self, ea: Ea, iflags: &[(CitemLocator, i32)])
        -> Result<(), HostError>;
    fn save_user_lvar_settings(&mut self, ea: Ea, settings: &LvarSettings)
        -> Result<(), HostError>;
    fn save_user_numforms(
        &mut self,
        ea: Ea,
        numforms: &[(OperandLocator, NumberFormat)],
    ) -> Result<(), HostError>;
}

/// View refreshes. Fire-and-forget: these never fail and never block.
pub trait ViewOps {
    fn request_refresh(&mut self, target: RefreshTarget);

    /// Repaint the decompiled view of the function containing `ea`, if one
    /// is open.
    fn refresh_decompiler_view(&mut self, ea: Ea);
}

/// The full host surface the replay engine requires.
pub trait Host: ByteOps + FunctionOps + SegmentOps + TypeOps + DecompilerOps + ViewOps {}

impl<T: ByteOps + FunctionOps + SegmentOps + TypeOps + DecompilerOps + ViewOps> Host for T {}
