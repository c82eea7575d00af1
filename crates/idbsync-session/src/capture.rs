//! Hook capture layer.
//!
//! The host glue forwards its notification callbacks to a [`Recorder`],
//! which turns them into events and hands them to the session. A shared
//! [`CaptureSwitch`] gates the whole layer: capture is off until the
//! session joins, and an RAII [`SuppressGuard`] silences it for the full
//! extent of every replayed mutation so replay never echoes back as a
//! fresh capture.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};

use idbsync_core::host::{SegmentOps, TypeOps};
use idbsync_core::local_types::{TypeChunk, TypePatch};
use idbsync_core::payloads::{
    CitemLocator, LvarSettings, MemberExtra, NumberFormat, OperandLocator, OperandRepr,
    SegmentDef, TreeLoc,
};
use idbsync_core::{Ea, Event, RawData, TypeCatalogue};

use crate::session::SyncSession;
use crate::state::StateStore;
use crate::transport::Transport;

#[derive(Default)]
struct SwitchState {
    hooked: bool,
    suppress: u32,
}

/// Shared on/off gate for the capture layer.
///
/// `hook_all`/`unhook_all` are idempotent. Suppression nests: capture is
/// live only while hooked and not suppressed.
#[derive(Clone, Default)]
pub struct CaptureSwitch {
    inner: Rc<RefCell<SwitchState>>,
}

impl CaptureSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook_all(&self) {
        let mut state = self.inner.borrow_mut();
        if state.hooked {
            return;
        }
        debug!("installing capture hooks");
        state.hooked = true;
    }

    pub fn unhook_all(&self) {
        let mut state = self.inner.borrow_mut();
        if !state.hooked {
            return;
        }
        debug!("uninstalling capture hooks");
        state.hooked = false;
    }

    pub fn is_hooked(&self) -> bool {
        self.inner.borrow().hooked
    }

    pub fn is_capturing(&self) -> bool {
        let state = self.inner.borrow();
        state.hooked && state.suppress == 0
    }

    /// Silence capture until the returned guard drops.
    pub fn suppress(&self) -> SuppressGuard {
        self.inner.borrow_mut().suppress += 1;
        SuppressGuard {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// RAII handle from [`CaptureSwitch::suppress`].
pub struct SuppressGuard {
    inner: Rc<RefCell<SwitchState>>,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        self.inner.borrow_mut().suppress -= 1;
    }
}

/// Shared diff baseline for the local type catalogue.
///
/// The recorder diffs each notification against it. The session also holds
/// a handle: a replayed catalogue rewrite mutates the host with capture
/// suppressed, so the baseline must move forward at replay time or the
/// next local notification would re-emit the remote patches as a capture.
#[derive(Clone, Default)]
pub struct TypeBaseline {
    inner: Rc<RefCell<TypeCatalogue>>,
}

impl TypeBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the baseline with a fresh catalogue snapshot.
    pub fn replace(&self, catalogue: TypeCatalogue) {
        *self.inner.borrow_mut() = catalogue;
    }

    /// Diff the baseline against `current`, then advance it to `current`.
    fn advance(&self, current: TypeCatalogue) -> Vec<TypePatch> {
        let mut baseline = self.inner.borrow_mut();
        let patches = baseline.diff(&current);
        *baseline = current;
        patches
    }
}

/// Byte- and address-level notifications from the host.
pub trait DatabaseNotifications {
    fn make_code(&mut self, ea: Ea);
    fn make_data(&mut self, ea: Ea, flags: u32, size: u64, sname: &str);
    fn renamed(&mut self, ea: Ea, new_name: &str, local_name: bool);
    fn byte_patched(&mut self, ea: Ea, value: u8);
    fn cmt_changed(&mut self, ea: Ea, comment: &str, rptble: bool);
    fn range_cmt_changed(&mut self, kind: u32, start_ea: Ea, end_ea: Ea, cmt: &str, rptble: bool);
    fn extra_cmt_changed(&mut self, ea: Ea, line_idx: i32, cmt: &str);
    fn ti_changed(&mut self, ea: Ea, name: &str, type_chunks: Vec<TypeChunk>, fields: RawData);
    fn op_type_changed(&mut self, ea: Ea, n: u8, op: OperandRepr);
    fn undefined(&mut self, ea: Ea);
    fn make_unknown(&mut self, ea: Ea);
    fn bookmark_changed(&mut self, ea: Ea, pos: u64, cmt: &str);
}

pub trait FunctionNotifications {
    fn func_added(&mut self, start_ea: Ea, end_ea: Ea);
    fn deleting_func(&mut self, start_ea: Ea);
    fn set_func_start(&mut self, start_ea: Ea, new_start: Ea);
    fn set_func_end(&mut self, start_ea: Ea, new_end: Ea);
    fn func_tail_appended(&mut self, start_ea_func: Ea, start_ea_tail: Ea, end_ea_tail: Ea);
    fn func_tail_deleted(&mut self, start_ea_func: Ea, tail_ea: Ea);
    fn tail_owner_changed(&mut self, tail_ea: Ea, owner_func: Ea);
}

pub trait SegmentNotifications {
    fn segm_added(&mut self, def: SegmentDef);
    fn segm_deleted(&mut self, ea: Ea, flags: u16);
    fn segm_start_changed(&mut self, ea: Ea, newstart: Ea);
    fn segm_end_changed(&mut self, ea: Ea, newend: Ea);
    fn segm_name_changed(&mut self, ea: Ea, name: &str);
    fn segm_class_changed(&mut self, ea: Ea, sclass: &str);
    fn segm_attrs_updated(&mut self, ea: Ea, perm: u8, bitness: u8);
    fn segm_moved(&mut self, from_ea: Ea, to_ea: Ea, changed_netmap: bool);

    /// A segment register changed; the current ranges are read back from
    /// the host because the callback itself carries none.
    fn sgr_changed(&mut self, host: &dyn SegmentOps, rg: u16);
}

pub trait TypeNotifications {
    fn enum_created(&mut self, name: &str);
    fn enum_deleted(&mut self, ename: &str);
    fn enum_renamed(&mut self, oldname: &str, newname: &str, is_enum: bool);
    fn enum_bf_changed(&mut self, ename: &str, bf_flag: bool);
    fn enum_cmt_changed(&mut self, emname: &str, cmt: &str, repeatable_cmt: bool);
    fn enum_member_created(&mut self, ename: &str, name: &str, value: u64, bmask: u64);
    fn enum_member_deleted(&mut self, ename: &str, value: u64, serial: u8, bmask: u64);

    fn struc_created(&mut self, name: &str, is_union: bool);
    fn struc_deleted(&mut self, sname: &str);
    fn struc_renamed(&mut self, oldname: &str, newname: &str);
    fn struc_cmt_changed(&mut self, sname: &str, smname: &str, cmt: &str, repeatable_cmt: bool);
    fn struc_member_created(
        &mut self,
        sname: &str,
        fieldname: &str,
        offset: u64,
        flag: u32,
        nbytes: u64,
        extra: MemberExtra,
    );
    fn struc_member_changed(
        &mut self,
        sname: &str,
        soff: u64,
        eoff: u64,
        flag: u32,
        extra: MemberExtra,
    );
    fn struc_member_deleted(&mut self, sname: &str, offset: u64);
    fn struc_member_renamed(&mut self, sname: &str, offset: u64, newname: &str);
    fn expanding_struc(&mut self, sname: &str, offset: u64, delta: i64);

    /// The local type window changed in some way; the concrete edits are
    /// recovered by diffing the catalogue against the last snapshot.
    fn local_types_changed(&mut self, host: &dyn TypeOps);
}

pub trait DecompilerNotifications {
    fn user_labels(&mut self, ea: Ea, labels: Vec<(i32, String)>);
    fn user_cmts(&mut self, ea: Ea, cmts: Vec<(TreeLoc, String)>);
    fn user_iflags(&mut self, ea: Ea, iflags: Vec<(CitemLocator, i32)>);
    fn user_lvar_settings(&mut self, ea: Ea, lvar_settings: LvarSettings);
    fn user_numforms(&mut self, ea: Ea, numforms: Vec<(OperandLocator, NumberFormat)>);
}

pub trait ViewNotifications {
    /// The user moved their cursor to a new location.
    fn view_loc_changed(&mut self, ea: Ea);
}

/// Turns host notifications into captured events.
pub struct Recorder<S: StateStore + 'static, T: Transport + 'static> {
    session: SyncSession<S, T>,
    switch: CaptureSwitch,
    baseline: TypeBaseline,
}

impl<S: StateStore + 'static, T: Transport + 'static> Recorder<S, T> {
    pub fn new(session: SyncSession<S, T>) -> Self {
        let switch = session.capture_switch();
        let baseline = session.type_baseline();
        Self {
            session,
            switch,
            baseline,
        }
    }

    /// Snapshot the host's type catalogue as the diff baseline.
    ///
    /// The host glue calls this when capture comes up (and after any bulk
    /// operation that rewrites the catalogue outside the hook path).
    pub fn prime(&mut self, host: &dyn TypeOps) {
        match host.read_type_catalogue() {
            Ok(catalogue) => self.baseline.replace(catalogue),
            Err(err) => warn!(%err, "could not snapshot type catalogue"),
        }
    }

    fn capture(&self, event: Event) {
        if !self.switch.is_capturing() {
            return;
        }
        self.session.record(&event);
    }
}

impl<S: StateStore, T: Transport> DatabaseNotifications for Recorder<S, T> {
    fn make_code(&mut self, ea: Ea) {
        self.capture(Event::MakeCode { ea });
    }

    fn make_data(&mut self, ea: Ea, flags: u32, size: u64, sname: &str) {
        self.capture(Event::MakeData {
            ea,
            flags,
            size,
            sname: sname.to_string(),
        });
    }

    fn renamed(&mut self, ea: Ea, new_name: &str, local_name: bool) {
        self.capture(Event::Renamed {
            ea,
            new_name: new_name.to_string(),
            local_name,
        });
    }

    fn byte_patched(&mut self, ea: Ea, value: u8) {
        self.capture(Event::BytePatched { ea, value });
    }

    fn cmt_changed(&mut self, ea: Ea, comment: &str, rptble: bool) {
        self.capture(Event::CmtChanged {
            ea,
            comment: comment.to_string(),
            rptble,
        });
    }

    fn range_cmt_changed(&mut self, kind: u32, start_ea: Ea, end_ea: Ea, cmt: &str, rptble: bool) {
        self.capture(Event::RangeCmtChanged {
            kind,
            start_ea,
            end_ea,
            cmt: cmt.to_string(),
            rptble,
        });
    }

    fn extra_cmt_changed(&mut self, ea: Ea, line_idx: i32, cmt: &str) {
        self.capture(Event::ExtraCmtChanged {
            ea,
            line_idx,
            cmt: cmt.to_string(),
        });
    }

    fn ti_changed(&mut self, ea: Ea, name: &str, type_chunks: Vec<TypeChunk>, fields: RawData) {
        self.capture(Event::TiChanged {
            ea,
            name: name.to_string(),
            type_chunks,
            fields,
        });
    }

    fn op_type_changed(&mut self, ea: Ea, n: u8, op: OperandRepr) {
        self.capture(Event::OpTypeChanged { ea, n, op });
    }

    fn undefined(&mut self, ea: Ea) {
        self.capture(Event::Undefined { ea });
    }

    fn make_unknown(&mut self, ea: Ea) {
        self.capture(Event::MakeUnknown { ea });
    }

    fn bookmark_changed(&mut self, ea: Ea, pos: u64, cmt: &str) {
        self.capture(Event::BookmarkChanged {
            ea,
            pos,
            cmt: cmt.to_string(),
        });
    }
}

impl<S: StateStore, T: Transport> FunctionNotifications for Recorder<S, T> {
    fn func_added(&mut self, start_ea: Ea, end_ea: Ea) {
        self.capture(Event::FuncAdded { start_ea, end_ea });
    }

    fn deleting_func(&mut self, start_ea: Ea) {
        self.capture(Event::DeletingFunc { start_ea });
    }

    fn set_func_start(&mut self, start_ea: Ea, new_start: Ea) {
        self.capture(Event::SetFuncStart {
            start_ea,
            new_start,
        });
    }

    fn set_func_end(&mut self, start_ea: Ea, new_end: Ea) {
        self.capture(Event::SetFuncEnd { start_ea, new_end });
    }

    fn func_tail_appended(&mut self, start_ea_func: Ea, start_ea_tail: Ea, end_ea_tail: Ea) {
        self.capture(Event::FuncTailAppended {
            start_ea_func,
            start_ea_tail,
            end_ea_tail,
        });
    }

    fn func_tail_deleted(&mut self, start_ea_func: Ea, tail_ea: Ea) {
        self.capture(Event::FuncTailDeleted {
            start_ea_func,
            tail_ea,
        });
    }

    fn tail_owner_changed(&mut self, tail_ea: Ea, owner_func: Ea) {
        self.capture(Event::TailOwnerChanged {
            tail_ea,
            owner_func,
        });
    }
}

impl<S: StateStore, T: Transport> SegmentNotifications for Recorder<S, T> {
    fn segm_added(&mut self, def: SegmentDef) {
        self.capture(Event::SegmAdded { def });
    }

    fn segm_deleted(&mut self, ea: Ea, flags: u16) {
        self.capture(Event::SegmDeleted { ea, flags });
    }

    fn segm_start_changed(&mut self, ea: Ea, newstart: Ea) {
        self.capture(Event::SegmStartChanged { ea, newstart });
    }

    fn segm_end_changed(&mut self, ea: Ea, newend: Ea) {
        self.capture(Event::SegmEndChanged { ea, newend });
    }

    fn segm_name_changed(&mut self, ea: Ea, name: &str) {
        self.capture(Event::SegmNameChanged {
            ea,
            name: name.to_string(),
        });
    }

    fn segm_class_changed(&mut self, ea: Ea, sclass: &str) {
        self.capture(Event::SegmClassChanged {
            ea,
            sclass: sclass.to_string(),
        });
    }

    fn segm_attrs_updated(&mut self, ea: Ea, perm: u8, bitness: u8) {
        self.capture(Event::SegmAttrsUpdated { ea, perm, bitness });
    }

    fn segm_moved(&mut self, from_ea: Ea, to_ea: Ea, changed_netmap: bool) {
        self.capture(Event::SegmMoved {
            from_ea,
            to_ea,
            changed_netmap,
        });
    }

    fn sgr_changed(&mut self, host: &dyn SegmentOps, rg: u16) {
        if !self.switch.is_capturing() {
            return;
        }
        match host.sreg_ranges(rg) {
            Ok(sreg_ranges) => self.capture(Event::SgrChanged { rg, sreg_ranges }),
            Err(err) => warn!(rg, %err, "could not read segment register ranges"),
        }
    }
}

impl<S: StateStore, T: Transport> TypeNotifications for Recorder<S, T> {
    fn enum_created(&mut self, name: &str) {
        self.capture(Event::EnumCreated {
            name: name.to_string(),
        });
    }

    fn enum_deleted(&mut self, ename: &str) {
        self.capture(Event::EnumDeleted {
            ename: ename.to_string(),
        });
    }

    fn enum_renamed(&mut self, oldname: &str, newname: &str, is_enum: bool) {
        self.capture(Event::EnumRenamed {
            oldname: oldname.to_string(),
            newname: newname.to_string(),
            is_enum,
        });
    }

    fn enum_bf_changed(&mut self, ename: &str, bf_flag: bool) {
        self.capture(Event::EnumBfChanged {
            ename: ename.to_string(),
            bf_flag,
        });
    }

    fn enum_cmt_changed(&mut self, emname: &str, cmt: &str, repeatable_cmt: bool) {
        self.capture(Event::EnumCmtChanged {
            emname: emname.to_string(),
            cmt: cmt.to_string(),
            repeatable_cmt,
        });
    }

    fn enum_member_created(&mut self, ename: &str, name: &str, value: u64, bmask: u64) {
        self.capture(Event::EnumMemberCreated {
            ename: ename.to_string(),
            name: name.to_string(),
            value,
            bmask,
        });
    }

    fn enum_member_deleted(&mut self, ename: &str, value: u64, serial: u8, bmask: u64) {
        self.capture(Event::EnumMemberDeleted {
            ename: ename.to_string(),
            value,
            serial,
            bmask,
        });
    }

    fn struc_created(&mut self, name: &str, is_union: bool) {
        self.capture(Event::StrucCreated {
            name: name.to_string(),
            is_union,
        });
    }

    fn struc_deleted(&mut self, sname: &str) {
        self.capture(Event::StrucDeleted {
            sname: sname.to_string(),
        });
    }

    fn struc_renamed(&mut self, oldname: &str, newname: &str) {
        self.capture(Event::StrucRenamed {
            oldname: oldname.to_string(),
            newname: newname.to_string(),
        });
    }

    fn struc_cmt_changed(&mut self, sname: &str, smname: &str, cmt: &str, repeatable_cmt: bool) {
        self.capture(Event::StrucCmtChanged {
            sname: sname.to_string(),
            smname: smname.to_string(),
            cmt: cmt.to_string(),
            repeatable_cmt,
        });
    }

    fn struc_member_created(
        &mut self,
        sname: &str,
        fieldname: &str,
        offset: u64,
        flag: u32,
        nbytes: u64,
        extra: MemberExtra,
    ) {
        self.capture(Event::StrucMemberCreated {
            sname: sname.to_string(),
            fieldname: fieldname.to_string(),
            offset,
            flag,
            nbytes,
            extra,
        });
    }

    fn struc_member_changed(
        &mut self,
        sname: &str,
        soff: u64,
        eoff: u64,
        flag: u32,
        extra: MemberExtra,
    ) {
        self.capture(Event::StrucMemberChanged {
            sname: sname.to_string(),
            soff,
            eoff,
            flag,
            extra,
        });
    }

    fn struc_member_deleted(&mut self, sname: &str, offset: u64) {
        self.capture(Event::StrucMemberDeleted {
            sname: sname.to_string(),
            offset,
        });
    }

    fn struc_member_renamed(&mut self, sname: &str, offset: u64, newname: &str) {
        self.capture(Event::StrucMemberRenamed {
            sname: sname.to_string(),
            offset,
            newname: newname.to_string(),
        });
    }

    fn expanding_struc(&mut self, sname: &str, offset: u64, delta: i64) {
        self.capture(Event::ExpandingStruc {
            sname: sname.to_string(),
            offset,
            delta,
        });
    }

    fn local_types_changed(&mut self, host: &dyn TypeOps) {
        if !self.switch.is_capturing() {
            return;
        }
        let current = match host.read_type_catalogue() {
            Ok(catalogue) => catalogue,
            Err(err) => {
                warn!(%err, "could not read type catalogue, diff skipped");
                return;
            }
        };
        let patches = self.baseline.advance(current);
        if patches.is_empty() {
            return;
        }
        self.capture(Event::LocalTypesChanged { patches });
    }
}

impl<S: StateStore, T: Transport> DecompilerNotifications for Recorder<S, T> {
    fn user_labels(&mut self, ea: Ea, labels: Vec<(i32, String)>) {
        self.capture(Event::UserLabels { ea, labels });
    }

    fn user_cmts(&mut self, ea: Ea, cmts: Vec<(TreeLoc, String)>) {
        self.capture(Event::UserCmts { ea, cmts });
    }

    fn user_iflags(&mut self, ea: Ea, iflags: Vec<(CitemLocator, i32)>) {
        self.capture(Event::UserIflags { ea, iflags });
    }

    fn user_lvar_settings(&mut self, ea: Ea, lvar_settings: LvarSettings) {
        self.capture(Event::UserLvarSettings { ea, lvar_settings });
    }

    fn user_numforms(&mut self, ea: Ea, numforms: Vec<(OperandLocator, NumberFormat)>) {
        self.capture(Event::UserNumforms { ea, numforms });
    }
}

impl<S: StateStore, T: Transport> ViewNotifications for Recorder<S, T> {
    fn view_loc_changed(&mut self, ea: Ea) {
        // Cursor moves are presence traffic, not history: they bypass the
        // capture gate's suppression but still require a joined session.
        self.session.update_location(ea);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_all_is_idempotent() {
        let switch = CaptureSwitch::new();
        assert!(!switch.is_hooked());
        switch.hook_all();
        switch.hook_all();
        assert!(switch.is_hooked());
        switch.unhook_all();
        switch.unhook_all();
        assert!(!switch.is_hooked());
    }

    #[test]
    fn suppression_nests() {
        let switch = CaptureSwitch::new();
        switch.hook_all();
        assert!(switch.is_capturing());
        {
            let _outer = switch.suppress();
            assert!(!switch.is_capturing());
            {
                let _inner = switch.suppress();
                assert!(!switch.is_capturing());
            }
            assert!(!switch.is_capturing());
        }
        assert!(switch.is_capturing());
    }

    #[test]
    fn unhooked_switch_never_captures() {
        let switch = CaptureSwitch::new();
        assert!(!switch.is_capturing());
    }
}
