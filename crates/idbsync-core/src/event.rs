//! The event taxonomy.
//!
//! One variant per kind of database mutation that travels between
//! collaborators. The wire tags are load-bearing: they are the legacy
//! protocol's event names and must never change. Fields carry only the
//! immutable facts needed to reproduce the mutation on another copy of the
//! same snapshot; numeric ids, ordinals, and other per-copy handles never
//! travel, names do.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{ApplyError, HostError};
use crate::host::{Host, RefreshTarget};
use crate::local_types::{build_type_blob, TypeChunk, TypePatch};
use crate::payloads::{
    CitemLocator, LvarSettings, MemberExtra, NumberFormat, OperandLocator, OperandRepr,
    SegmentDef, SregRange, TreeLoc,
};
use crate::types::{Ea, RawData};

/// Range kinds understood by `range_cmt_changed`. Anything else fails the
/// event with [`ApplyError::UnsupportedRangeKind`].
pub const RANGE_KIND_FUNC: u32 = 1;
pub const RANGE_KIND_SEGMENT: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    #[serde(rename = "make_code")]
    MakeCode { ea: Ea },

    #[serde(rename = "make_data")]
    MakeData {
        ea: Ea,
        flags: u32,
        size: u64,
        /// Struct name for struct items, empty otherwise.
        sname: String,
    },

    #[serde(rename = "renamed")]
    Renamed {
        ea: Ea,
        new_name: String,
        local_name: bool,
    },

    #[serde(rename = "func_added")]
    FuncAdded { start_ea: Ea, end_ea: Ea },

    #[serde(rename = "deleting_func")]
    DeletingFunc { start_ea: Ea },

    #[serde(rename = "set_func_start")]
    SetFuncStart { start_ea: Ea, new_start: Ea },

    #[serde(rename = "set_func_end")]
    SetFuncEnd { start_ea: Ea, new_end: Ea },

    #[serde(rename = "func_tail_appended")]
    FuncTailAppended {
        start_ea_func: Ea,
        start_ea_tail: Ea,
        end_ea_tail: Ea,
    },

    #[serde(rename = "func_tail_deleted")]
    FuncTailDeleted { start_ea_func: Ea, tail_ea: Ea },

    #[serde(rename = "tail_owner_changed")]
    TailOwnerChanged { tail_ea: Ea, owner_func: Ea },

    #[serde(rename = "cmt_changed")]
    CmtChanged {
        ea: Ea,
        comment: String,
        rptble: bool,
    },

    #[serde(rename = "range_cmt_changed")]
    RangeCmtChanged {
        kind: u32,
        start_ea: Ea,
        end_ea: Ea,
        cmt: String,
        rptble: bool,
    },

    #[serde(rename = "extra_cmt_changed")]
    ExtraCmtChanged { ea: Ea, line_idx: i32, cmt: String },

    #[serde(rename = "ti_changed")]
    TiChanged {
        ea: Ea,
        /// `Struct.member` full name when the type targets a member, empty
        /// when it targets the address itself.
        name: String,
        type_chunks: Vec<TypeChunk>,
        fields: RawData,
    },

    #[serde(rename = "local_types_changed")]
    LocalTypesChanged { patches: Vec<TypePatch> },

    #[serde(rename = "op_type_changed")]
    OpTypeChanged { ea: Ea, n: u8, op: OperandRepr },

    #[serde(rename = "enum_created")]
    EnumCreated { name: String },

    #[serde(rename = "enum_deleted")]
    EnumDeleted { ename: String },

    #[serde(rename = "enum_renamed")]
    EnumRenamed {
        oldname: String,
        newname: String,
        /// True when the enum itself was renamed, false for a member.
        is_enum: bool,
    },

    #[serde(rename = "enum_bf_changed")]
    EnumBfChanged { ename: String, bf_flag: bool },

    #[serde(rename = "enum_cmt_changed")]
    EnumCmtChanged {
        emname: String,
        cmt: String,
        repeatable_cmt: bool,
    },

    #[serde(rename = "enum_member_created")]
    EnumMemberCreated {
        ename: String,
        name: String,
        value: u64,
        bmask: u64,
    },

    #[serde(rename = "enum_member_deleted")]
    EnumMemberDeleted {
        ename: String,
        value: u64,
        serial: u8,
        bmask: u64,
    },

    #[serde(rename = "struc_created")]
    StrucCreated { name: String, is_union: bool },

    #[serde(rename = "struc_deleted")]
    StrucDeleted { sname: String },

    #[serde(rename = "struc_renamed")]
    StrucRenamed { oldname: String, newname: String },

    #[serde(rename = "struc_cmt_changed")]
    StrucCmtChanged {
        sname: String,
        /// Member name, empty when the comment is on the struct itself.
        smname: String,
        cmt: String,
        repeatable_cmt: bool,
    },

    #[serde(rename = "struc_member_created")]
    StrucMemberCreated {
        sname: String,
        fieldname: String,
        offset: u64,
        flag: u32,
        nbytes: u64,
        extra: MemberExtra,
    },

    #[serde(rename = "struc_member_changed")]
    StrucMemberChanged {
        sname: String,
        soff: u64,
        eoff: u64,
        flag: u32,
        extra: MemberExtra,
    },

    #[serde(rename = "struc_member_deleted")]
    StrucMemberDeleted { sname: String, offset: u64 },

    #[serde(rename = "struc_member_renamed")]
    StrucMemberRenamed {
        sname: String,
        offset: u64,
        newname: String,
    },

    #[serde(rename = "expanding_struc")]
    ExpandingStruc {
        sname: String,
        offset: u64,
        delta: i64,
    },

    #[serde(rename = "segm_added_event")]
    SegmAdded {
        #[serde(flatten)]
        def: SegmentDef,
    },

    #[serde(rename = "segm_deleted_event")]
    SegmDeleted {
        ea: Ea,
        /// Events recorded by old captures lack this field.
        #[serde(default)]
        flags: u16,
    },

    #[serde(rename = "segm_start_changed_event")]
    SegmStartChanged { ea: Ea, newstart: Ea },

    #[serde(rename = "segm_end_changed_event")]
    SegmEndChanged { ea: Ea, newend: Ea },

    #[serde(rename = "segm_name_changed_event")]
    SegmNameChanged { ea: Ea, name: String },

    #[serde(rename = "segm_class_changed_event")]
    SegmClassChanged { ea: Ea, sclass: String },

    #[serde(rename = "segm_attrs_updated_event")]
    SegmAttrsUpdated { ea: Ea, perm: u8, bitness: u8 },

    #[serde(rename = "segm_moved_event")]
    SegmMoved {
        from_ea: Ea,
        to_ea: Ea,
        changed_netmap: bool,
    },

    #[serde(rename = "undefined")]
    Undefined { ea: Ea },

    #[serde(rename = "byte_patched")]
    BytePatched { ea: Ea, value: u8 },

    #[serde(rename = "bookmark_changed")]
    BookmarkChanged { ea: Ea, pos: u64, cmt: String },

    #[serde(rename = "sgr_changed")]
    SgrChanged {
        rg: u16,
        sreg_ranges: Vec<SregRange>,
    },

    #[serde(rename = "make_unknown")]
    MakeUnknown { ea: Ea },

    #[serde(rename = "user_labels")]
    UserLabels {
        ea: Ea,
        labels: Vec<(i32, String)>,
    },

    #[serde(rename = "user_cmts")]
    UserCmts {
        ea: Ea,
        cmts: Vec<(TreeLoc, String)>,
    },

    #[serde(rename = "user_iflags")]
    UserIflags {
        ea: Ea,
        iflags: Vec<(CitemLocator, i32)>,
    },

    #[serde(rename = "user_lvar_settings")]
    UserLvarSettings { ea: Ea, lvar_settings: LvarSettings },

    #[serde(rename = "user_numforms")]
    UserNumforms {
        ea: Ea,
        numforms: Vec<(OperandLocator, NumberFormat)>,
    },
}

impl Event {
    /// The stable wire tag of this event.
    pub fn tag(&self) -> &'static str {
        match self {
            Event::MakeCode { .. } => "make_code",
            Event::MakeData { .. } => "make_data",
            Event::Renamed { .. } => "renamed",
            Event::FuncAdded { .. } => "func_added",
            Event::DeletingFunc { .. } => "deleting_func",
            Event::SetFuncStart { .. } => "set_func_start",
            Event::SetFuncEnd { .. } => "set_func_end",
            Event::FuncTailAppended { .. } => "func_tail_appended",
            Event::FuncTailDeleted { .. } => "func_tail_deleted",
            Event::TailOwnerChanged { .. } => "tail_owner_changed",
            Event::CmtChanged { .. } => "cmt_changed",
            Event::RangeCmtChanged { .. } => "range_cmt_changed",
            Event::ExtraCmtChanged { .. } => "extra_cmt_changed",
            Event::TiChanged { .. } => "ti_changed",
            Event::LocalTypesChanged { .. } => "local_types_changed",
            Event::OpTypeChanged { .. } => "op_type_changed",
            Event::EnumCreated { .. } => "enum_created",
            Event::EnumDeleted { .. } => "enum_deleted",
            Event::EnumRenamed { .. } => "enum_renamed",
            Event::EnumBfChanged { .. } => "enum_bf_changed",
            Event::EnumCmtChanged { .. } => "enum_cmt_changed",
            Event::EnumMemberCreated { .. } => "enum_member_created",
            Event::EnumMemberDeleted { .. } => "enum_member_deleted",
            Event::StrucCreated { .. } => "struc_created",
            Event::StrucDeleted { .. } => "struc_deleted",
            Event::StrucRenamed { .. } => "struc_renamed",
            Event::StrucCmtChanged { .. } => "struc_cmt_changed",
            Event::StrucMemberCreated { .. } => "struc_member_created",
            Event::StrucMemberChanged { .. } => "struc_member_changed",
            Event::StrucMemberDeleted { .. } => "struc_member_deleted",
            Event::StrucMemberRenamed { .. } => "struc_member_renamed",
            Event::ExpandingStruc { .. } => "expanding_struc",
            Event::SegmAdded { .. } => "segm_added_event",
            Event::SegmDeleted { .. } => "segm_deleted_event",
            Event::SegmStartChanged { .. } => "segm_start_changed_event",
            Event::SegmEndChanged { .. } => "segm_end_changed_event",
            Event::SegmNameChanged { .. } => "segm_name_changed_event",
            Event::SegmClassChanged { .. } => "segm_class_changed_event",
            Event::SegmAttrsUpdated { .. } => "segm_attrs_updated_event",
            Event::SegmMoved { .. } => "segm_moved_event",
            Event::Undefined { .. } => "undefined",
            Event::BytePatched { .. } => "byte_patched",
            Event::BookmarkChanged { .. } => "bookmark_changed",
            Event::SgrChanged { .. } => "sgr_changed",
            Event::MakeUnknown { .. } => "make_unknown",
            Event::UserLabels { .. } => "user_labels",
            Event::UserCmts { .. } => "user_cmts",
            Event::UserIflags { .. } => "user_iflags",
            Event::UserLvarSettings { .. } => "user_lvar_settings",
            Event::UserNumforms { .. } => "user_numforms",
        }
    }

    /// Reproduce this event's mutation in the host.
    ///
    /// This is the single place host mutation calls occur. A failure aborts
    /// this event only; callers continue with the rest of the batch.
    pub fn apply(&self, host: &mut dyn Host) -> Result<(), ApplyError> {
        let tag = self.tag();
        let fail = |source: HostError| ApplyError::Host { tag, source };

        match self {
            Event::MakeCode { ea } => host.make_code(*ea).map_err(fail),

            Event::MakeData {
                ea,
                flags,
                size,
                sname,
            } => {
                let sname = (!sname.is_empty()).then_some(sname.as_str());
                host.make_data(*ea, *flags, *size, sname).map_err(fail)
            }

            Event::Renamed {
                ea,
                new_name,
                local_name,
            } => {
                host.set_name(*ea, new_name, *local_name).map_err(fail)?;
                host.request_refresh(RefreshTarget::Listing);
                host.request_refresh(RefreshTarget::StackView);
                host.refresh_decompiler_view(*ea);
                Ok(())
            }

            Event::FuncAdded { start_ea, end_ea } => {
                host.add_func(*start_ea, *end_ea).map_err(fail)
            }

            Event::DeletingFunc { start_ea } => host.del_func(*start_ea).map_err(fail),

            Event::SetFuncStart {
                start_ea,
                new_start,
            } => host.set_func_start(*start_ea, *new_start).map_err(fail),

            Event::SetFuncEnd { start_ea, new_end } => {
                host.set_func_end(*start_ea, *new_end).map_err(fail)
            }

            Event::FuncTailAppended {
                start_ea_func,
                start_ea_tail,
                end_ea_tail,
            } => host
                .append_func_tail(*start_ea_func, *start_ea_tail, *end_ea_tail)
                .map_err(fail),

            Event::FuncTailDeleted {
                start_ea_func,
                tail_ea,
            } => host.remove_func_tail(*start_ea_func, *tail_ea).map_err(fail),

            Event::TailOwnerChanged {
                tail_ea,
                owner_func,
            } => host.set_tail_owner(*tail_ea, *owner_func).map_err(fail),

            Event::CmtChanged {
                ea,
                comment,
                rptble,
            } => host.set_cmt(*ea, comment, *rptble).map_err(fail),

            Event::RangeCmtChanged {
                kind,
                start_ea,
                cmt,
                rptble,
                ..
            } => match *kind {
                RANGE_KIND_FUNC => {
                    host.set_func_cmt(*start_ea, cmt, *rptble).map_err(fail)?;
                    host.refresh_decompiler_view(*start_ea);
                    Ok(())
                }
                RANGE_KIND_SEGMENT => {
                    host.set_segment_cmt(*start_ea, cmt, *rptble).map_err(fail)?;
                    host.request_refresh(RefreshTarget::Segments);
                    Ok(())
                }
                other => Err(ApplyError::UnsupportedRangeKind(other)),
            },

            Event::ExtraCmtChanged { ea, line_idx, cmt } => {
                host.del_extra_cmt(*ea, *line_idx).map_err(fail)?;
                if cmt.is_empty() {
                    return Ok(());
                }
                let isprev = line_idx - 1000 < 1000;
                host.add_extra_cmt(*ea, isprev, cmt).map_err(fail)
            }

            Event::TiChanged {
                ea,
                name,
                type_chunks,
                fields,
            } => {
                let mut target = *ea;
                if !name.is_empty() {
                    if let Some(member_id) = host.member_id_by_fullname(name) {
                        target = member_id;
                    }
                }
                let blob = build_type_blob(type_chunks, |n| host.local_type_ordinal(n))?;
                host.apply_type(target, &blob, fields).map_err(fail)?;
                host.request_refresh(RefreshTarget::Listing);
                host.refresh_decompiler_view(target);
                Ok(())
            }

            Event::LocalTypesChanged { patches } => {
                for patch in patches {
                    let result = match (&patch.old, &patch.new) {
                        (Some(old), None) => host.delete_local_type(&old.name),
                        (None, Some(new)) => host.insert_local_type(new),
                        (Some(old), Some(new)) => host.edit_local_type(&old.name, new),
                        (None, None) => Ok(()),
                    };
                    // One bad patch must not block the rest of the batch.
                    if let Err(err) = result {
                        warn!(ordinal = patch.ordinal, %err, "local type patch failed");
                    }
                }
                host.request_refresh(RefreshTarget::LocalTypes);
                Ok(())
            }

            Event::OpTypeChanged { ea, n, op } => {
                host.set_operand_repr(*ea, *n, op).map_err(fail)
            }

            Event::EnumCreated { name } => host.add_enum(name).map_err(fail),

            Event::EnumDeleted { ename } => host.del_enum(ename).map_err(fail),

            Event::EnumRenamed {
                oldname,
                newname,
                is_enum,
            } => {
                if *is_enum {
                    host.rename_enum(oldname, newname).map_err(fail)
                } else {
                    host.rename_enum_member(oldname, newname).map_err(fail)
                }
            }

            Event::EnumBfChanged { ename, bf_flag } => {
                host.set_enum_bf(ename, *bf_flag).map_err(fail)
            }

            Event::EnumCmtChanged {
                emname,
                cmt,
                repeatable_cmt,
            } => host.set_enum_cmt(emname, cmt, *repeatable_cmt).map_err(fail),

            Event::EnumMemberCreated {
                ename,
                name,
                value,
                bmask,
            } => host
                .add_enum_member(ename, name, *value, *bmask)
                .map_err(fail),

            Event::EnumMemberDeleted {
                ename,
                value,
                serial,
                bmask,
            } => host
                .del_enum_member(ename, *value, *serial, *bmask)
                .map_err(fail),

            Event::StrucCreated { name, is_union } => {
                host.add_struc(name, *is_union).map_err(fail)
            }

            Event::StrucDeleted { sname } => host.del_struc(sname).map_err(fail),

            Event::StrucRenamed { oldname, newname } => {
                host.rename_struc(oldname, newname).map_err(fail)
            }

            Event::StrucCmtChanged {
                sname,
                smname,
                cmt,
                repeatable_cmt,
            } => {
                if smname.is_empty() {
                    host.set_struc_cmt(sname, cmt, *repeatable_cmt).map_err(fail)
                } else {
                    host.set_struc_member_cmt(sname, smname, cmt, *repeatable_cmt)
                        .map_err(fail)
                }
            }

            Event::StrucMemberCreated {
                sname,
                fieldname,
                offset,
                flag,
                nbytes,
                extra,
            } => host
                .add_struc_member(sname, fieldname, *offset, *flag, *nbytes, extra)
                .map_err(fail),

            Event::StrucMemberChanged {
                sname,
                soff,
                eoff,
                flag,
                extra,
            } => {
                // The span comes off the wire; an inverted one fails the
                // event instead of wrapping into a huge size.
                let nbytes =
                    eoff.checked_sub(*soff)
                        .ok_or(ApplyError::InvertedMemberSpan {
                            soff: *soff,
                            eoff: *eoff,
                        })?;
                host.change_struc_member(sname, *soff, *flag, nbytes, extra)
                    .map_err(fail)
            }

            Event::StrucMemberDeleted { sname, offset } => {
                host.del_struc_member(sname, *offset).map_err(fail)
            }

            Event::StrucMemberRenamed {
                sname,
                offset,
                newname,
            } => host
                .rename_struc_member(sname, *offset, newname)
                .map_err(fail),

            Event::ExpandingStruc {
                sname,
                offset,
                delta,
            } => host.expand_struc(sname, *offset, *delta).map_err(fail),

            Event::SegmAdded { def } => host.add_segment(def).map_err(fail),

            Event::SegmDeleted { ea, flags } => host.del_segment(*ea, *flags).map_err(fail),

            Event::SegmStartChanged { ea, newstart } => {
                host.set_segment_start(*ea, *newstart).map_err(fail)
            }

            Event::SegmEndChanged { ea, newend } => {
                host.set_segment_end(*ea, *newend).map_err(fail)
            }

            Event::SegmNameChanged { ea, name } => {
                host.set_segment_name(*ea, name).map_err(fail)
            }

            Event::SegmClassChanged { ea, sclass } => {
                host.set_segment_class(*ea, sclass).map_err(fail)
            }

            Event::SegmAttrsUpdated { ea, perm, bitness } => {
                host.set_segment_attrs(*ea, *perm, *bitness).map_err(fail)
            }

            Event::SegmMoved {
                from_ea,
                to_ea,
                changed_netmap,
            } => host
                .move_segment(*from_ea, *to_ea, *changed_netmap)
                .map_err(fail),

            Event::Undefined { ea } => host.del_items(*ea, false).map_err(fail),

            Event::BytePatched { ea, value } => host.patch_byte(*ea, *value).map_err(fail),

            Event::BookmarkChanged { ea, pos, cmt } => {
                host.put_bookmark(*ea, *pos, cmt).map_err(fail)
            }

            Event::SgrChanged { rg, sreg_ranges } => {
                let old: BTreeMap<Ea, SregRange> = host
                    .sreg_ranges(*rg)
                    .map_err(fail)?
                    .into_iter()
                    .map(|r| (r.start_ea, r))
                    .collect();
                let new: BTreeMap<Ea, SregRange> =
                    sreg_ranges.iter().map(|r| (r.start_ea, *r)).collect();

                let mut start_eas: Vec<Ea> = old.keys().chain(new.keys()).copied().collect();
                start_eas.sort_unstable();
                start_eas.dedup();

                for start_ea in start_eas {
                    match (old.get(&start_ea), new.get(&start_ea)) {
                        (None, Some(n)) => host
                            .split_sreg_range(start_ea, *rg, n.value, n.tag)
                            .map_err(fail)?,
                        (Some(_), None) => {
                            host.del_sreg_range(start_ea, *rg).map_err(fail)?
                        }
                        (Some(o), Some(n)) if o.value != n.value || o.tag != n.tag => host
                            .split_sreg_range(start_ea, *rg, n.value, n.tag)
                            .map_err(fail)?,
                        _ => {}
                    }
                }
                host.request_refresh(RefreshTarget::SegRegs);
                Ok(())
            }

            Event::MakeUnknown { ea } => host.del_items(*ea, true).map_err(fail),

            Event::UserLabels { ea, labels } => {
                host.save_user_labels(*ea, labels).map_err(fail)?;
                host.refresh_decompiler_view(*ea);
                Ok(())
            }

            Event::UserCmts { ea, cmts } => {
                host.save_user_cmts(*ea, cmts).map_err(fail)?;
                host.refresh_decompiler_view(*ea);
                Ok(())
            }

            Event::UserIflags { ea, iflags } => {
                host.save_user_iflags(*ea, iflags).map_err(fail)?;
                host.refresh_decompiler_view(*ea);
                Ok(())
            }

            Event::UserLvarSettings { ea, lvar_settings } => {
                if *lvar_settings == LvarSettings::default() {
                    return Ok(());
                }
                host.save_user_lvar_settings(*ea, lvar_settings).map_err(fail)?;
                host.refresh_decompiler_view(*ea);
                Ok(())
            }

            Event::UserNumforms { ea, numforms } => {
                host.save_user_numforms(*ea, numforms).map_err(fail)?;
                host.refresh_decompiler_view(*ea);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tag_is_the_legacy_event_name() {
        let event = Event::MakeCode { ea: Ea(0x401000) };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "make_code");
        assert_eq!(json["ea"], 0x401000);
    }

    #[test]
    fn tag_matches_serialized_tag_across_sample() {
        let samples = [
            Event::Renamed {
                ea: Ea(0x10),
                new_name: "sub_10".into(),
                local_name: false,
            },
            Event::SegmMoved {
                from_ea: Ea(0x1000),
                to_ea: Ea(0x2000),
                changed_netmap: true,
            },
            Event::UserNumforms {
                ea: Ea(0x20),
                numforms: vec![],
            },
        ];
        for event in &samples {
            let json = serde_json::to_value(event).unwrap();
            assert_eq!(json["event"], event.tag());
        }
    }

    #[test]
    fn segm_added_fields_are_flat() {
        let event = Event::SegmAdded {
            def: SegmentDef {
                name: ".text".into(),
                class: "CODE".into(),
                start_ea: Ea(0x1000),
                end_ea: Ea(0x2000),
                orgbase: 0,
                align: 3,
                comb: 2,
                perm: 5,
                bitness: 1,
                flags: 0,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "segm_added_event");
        assert_eq!(json["name"], ".text");
        assert_eq!(json["class"], "CODE");
        assert!(json.get("def").is_none());
    }

    #[test]
    fn segm_deleted_flags_default_when_absent() {
        // Captures made before the flags field existed still decode.
        let json = serde_json::json!({"event": "segm_deleted_event", "ea": 0x1000});
        let event: Event = serde_json::from_value(json).unwrap();
        assert_eq!(event, Event::SegmDeleted { ea: Ea(0x1000), flags: 0 });
    }

    #[test]
    fn unknown_tag_fails_decode() {
        let json = serde_json::json!({"event": "no_such_event", "ea": 1});
        assert!(serde_json::from_value::<Event>(json).is_err());
    }
}
