//! Topology undo/redo event log.
//!
//! The remeshing engine emits one event per structural change through the
//! [`TopologyLog`] trait, grouped into entries (one entry per pass). The
//! in-memory implementation captures full element records so that replaying
//! an entry's events in reverse restores the mesh that existed before it,
//! with every element back at its original slot. Hosts that keep their own
//! history can plug in [`NullLog`] instead.

use glam::Vec3;
use tracing::warn;

use crate::attr::AttrBlock;
use crate::mesh::{EdgeSplitResult, Mesh};
use crate::types::{EdgeId, FaceId, HeadFlags, MeshError, VertId};

/// Snapshot of a vertex, sufficient to restore it at its slot.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VertRecord {
    pub co: Vec3,
    pub no: Vec3,
    pub flags: HeadFlags,
    pub attr: AttrBlock,
}

/// Snapshot of an edge.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EdgeRecord {
    pub v1: VertId,
    pub v2: VertId,
    pub flags: HeadFlags,
    pub attr: AttrBlock,
}

/// Snapshot of a face, including per-corner attribute blocks.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FaceRecord {
    pub verts: Vec<VertId>,
    pub flags: HeadFlags,
    pub mat: u16,
    pub attr: AttrBlock,
    pub loop_attrs: Vec<AttrBlock>,
}

/// A single logged topology event.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum LogEvent {
    VertAdded {
        v: VertId,
    },
    VertRemoved {
        v: VertId,
        rec: VertRecord,
    },
    /// Geometry-only before-modify snapshot; original-data layers are the
    /// annotation table's business, not the log's.
    VertModified {
        v: VertId,
        co: Vec3,
        no: Vec3,
    },
    EdgeAdded {
        e: EdgeId,
        v1: VertId,
        v2: VertId,
    },
    EdgeRemoved {
        e: EdgeId,
        rec: EdgeRecord,
    },
    FaceAdded {
        f: FaceId,
    },
    FaceRemoved {
        f: FaceId,
        rec: FaceRecord,
    },
    /// Atomic split of `e` at parameter `t`, producing `new_vert`/`new_edge`.
    EdgeSplit {
        e: EdgeId,
        rec: EdgeRecord,
        new_vert: VertId,
        new_edge: EdgeId,
        t: f32,
    },
}

/// Entry-structured event group; one per remeshing pass.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub label: String,
    pub events: Vec<LogEvent>,
}

/// Event sink the engine reports every structural mutation to.
///
/// Removal events must be emitted while the element is still alive so the
/// sink can snapshot it; addition events directly after creation.
pub trait TopologyLog {
    fn entry_push(&mut self, label: &str);
    fn vert_added(&mut self, mesh: &Mesh, v: VertId);
    fn vert_removed(&mut self, mesh: &Mesh, v: VertId);
    fn vert_before_modify(&mut self, mesh: &Mesh, v: VertId);
    fn edge_added(&mut self, mesh: &Mesh, e: EdgeId);
    fn edge_removed(&mut self, mesh: &Mesh, e: EdgeId);
    fn face_added(&mut self, mesh: &Mesh, f: FaceId);
    fn face_removed(&mut self, mesh: &Mesh, f: FaceId);

    /// Perform the kernel edge split and record it as one atomic event.
    fn edge_split(
        &mut self,
        mesh: &mut Mesh,
        e: EdgeId,
        t: f32,
    ) -> Result<EdgeSplitResult, MeshError> {
        mesh.edge_split(e, t)
    }
}

/// Log sink that discards everything.
#[derive(Debug, Default)]
pub struct NullLog;

impl TopologyLog for NullLog {
    fn entry_push(&mut self, _label: &str) {}
    fn vert_added(&mut self, _mesh: &Mesh, _v: VertId) {}
    fn vert_removed(&mut self, _mesh: &Mesh, _v: VertId) {}
    fn vert_before_modify(&mut self, _mesh: &Mesh, _v: VertId) {}
    fn edge_added(&mut self, _mesh: &Mesh, _e: EdgeId) {}
    fn edge_removed(&mut self, _mesh: &Mesh, _e: EdgeId) {}
    fn face_added(&mut self, _mesh: &Mesh, _f: FaceId) {}
    fn face_removed(&mut self, _mesh: &Mesh, _f: FaceId) {}
}

/// Append-only in-memory log with reverse replay.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Vec<LogEntry>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.events.is_empty())
    }

    fn push(&mut self, event: LogEvent) {
        if self.entries.is_empty() {
            self.entries.push(LogEntry::default());
        }
        if let Some(entry) = self.entries.last_mut() {
            entry.events.push(event);
        }
    }

    fn vert_record(mesh: &Mesh, v: VertId) -> Option<VertRecord> {
        let vert = mesh.vert(v)?;
        Some(VertRecord {
            co: vert.co.get(),
            no: vert.no,
            flags: vert.flags,
            attr: vert.attr.clone(),
        })
    }

    fn edge_record(mesh: &Mesh, e: EdgeId) -> Option<EdgeRecord> {
        let edge = mesh.edge(e)?;
        Some(EdgeRecord {
            v1: edge.v1,
            v2: edge.v2,
            flags: edge.flags,
            attr: edge.attr.clone(),
        })
    }

    fn face_record(mesh: &Mesh, f: FaceId) -> Option<FaceRecord> {
        let face = mesh.face(f)?;
        let loops = mesh.face_loops(f);
        Some(FaceRecord {
            verts: mesh.face_verts(f).to_vec(),
            flags: face.flags,
            mat: face.mat,
            attr: face.attr.clone(),
            loop_attrs: loops
                .iter()
                .filter_map(|&l| mesh.loop_ref(l).map(|ll| ll.attr.clone()))
                .collect(),
        })
    }

    /// Undo the most recent entry by replaying its events in reverse.
    pub fn undo_last_entry(&mut self, mesh: &mut Mesh) -> Result<(), MeshError> {
        let Some(entry) = self.entries.pop() else {
            return Ok(());
        };
        for event in entry.events.into_iter().rev() {
            Self::undo_event(mesh, event)?;
        }
        Ok(())
    }

    /// Undo every logged entry, newest first.
    pub fn undo_all(&mut self, mesh: &mut Mesh) -> Result<(), MeshError> {
        while !self.entries.is_empty() {
            self.undo_last_entry(mesh)?;
        }
        Ok(())
    }

    fn undo_event(mesh: &mut Mesh, event: LogEvent) -> Result<(), MeshError> {
        match event {
            LogEvent::VertAdded { v } => {
                if mesh.vert(v).is_some() {
                    mesh.vert_kill(v);
                }
            }
            LogEvent::VertRemoved { v, rec } => {
                mesh.restore_vert_at(v, rec.co, rec.no, rec.flags, rec.attr)?;
            }
            LogEvent::VertModified { v, co, no } => {
                if let Some(vert) = mesh.vert_mut(v) {
                    vert.co.set(co);
                    vert.no = no;
                }
            }
            LogEvent::EdgeAdded { e, .. } => match mesh.edge(e) {
                Some(edge) if edge.l.is_none() => mesh.edge_kill(e),
                Some(_) => warn!(?e, "undo of edge-added found loops, skipping"),
                None => {}
            },
            LogEvent::EdgeRemoved { e, rec } => {
                mesh.restore_edge_at(e, rec.v1, rec.v2, rec.flags, rec.attr)?;
            }
            LogEvent::FaceAdded { f } => {
                if mesh.face(f).is_some() {
                    mesh.face_kill(f);
                }
            }
            LogEvent::FaceRemoved { f, rec } => {
                mesh.restore_face_at(f, &rec.verts, rec.flags, rec.mat, rec.attr, &rec.loop_attrs)?;
            }
            LogEvent::EdgeSplit {
                e,
                rec,
                new_vert,
                new_edge,
                ..
            } => {
                // By the time the reverse replay reaches the split, all faces
                // it touched are gone and both halves are wire.
                match mesh.edge(new_edge) {
                    Some(edge) if edge.l.is_none() => mesh.edge_kill(new_edge),
                    Some(_) => warn!(?new_edge, "undo of edge-split found loops on new edge"),
                    None => {}
                }
                match mesh.edge(e) {
                    Some(edge) if edge.l.is_none() => mesh.edge_kill(e),
                    Some(_) => warn!(?e, "undo of edge-split found loops on old edge"),
                    None => {}
                }
                if mesh.vert(new_vert).is_some() {
                    mesh.vert_kill(new_vert);
                }
                mesh.restore_edge_at(e, rec.v1, rec.v2, rec.flags, rec.attr)?;
            }
        }
        Ok(())
    }
}

impl TopologyLog for MemoryLog {
    fn entry_push(&mut self, label: &str) {
        self.entries.push(LogEntry {
            label: label.to_owned(),
            events: Vec::new(),
        });
    }

    fn vert_added(&mut self, _mesh: &Mesh, v: VertId) {
        self.push(LogEvent::VertAdded { v });
    }

    fn vert_removed(&mut self, mesh: &Mesh, v: VertId) {
        if let Some(rec) = Self::vert_record(mesh, v) {
            self.push(LogEvent::VertRemoved { v, rec });
        }
    }

    fn vert_before_modify(&mut self, mesh: &Mesh, v: VertId) {
        if let Some(vert) = mesh.vert(v) {
            self.push(LogEvent::VertModified {
                v,
                co: vert.co.get(),
                no: vert.no,
            });
        }
    }

    fn edge_added(&mut self, mesh: &Mesh, e: EdgeId) {
        if let Some(edge) = mesh.edge(e) {
            self.push(LogEvent::EdgeAdded {
                e,
                v1: edge.v1,
                v2: edge.v2,
            });
        }
    }

    fn edge_removed(&mut self, mesh: &Mesh, e: EdgeId) {
        if let Some(rec) = Self::edge_record(mesh, e) {
            self.push(LogEvent::EdgeRemoved { e, rec });
        }
    }

    fn face_added(&mut self, _mesh: &Mesh, f: FaceId) {
        self.push(LogEvent::FaceAdded { f });
    }

    fn face_removed(&mut self, mesh: &Mesh, f: FaceId) {
        if let Some(rec) = Self::face_record(mesh, f) {
            self.push(LogEvent::FaceRemoved { f, rec });
        }
    }

    fn edge_split(
        &mut self,
        mesh: &mut Mesh,
        e: EdgeId,
        t: f32,
    ) -> Result<EdgeSplitResult, MeshError> {
        let rec = Self::edge_record(mesh, e).ok_or(MeshError::StaleId)?;
        let result = mesh.edge_split(e, t)?;
        self.push(LogEvent::EdgeSplit {
            e,
            rec,
            new_vert: result.new_vert,
            new_edge: result.new_edge,
            t,
        });
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn tri() -> (Mesh, [VertId; 3], FaceId) {
        let mut m = Mesh::new();
        let a = m.vert_create(Vec3::ZERO, Vec3::Z, None);
        let b = m.vert_create(Vec3::X, Vec3::Z, None);
        let c = m.vert_create(Vec3::Y, Vec3::Z, None);
        let f = m.face_create(&[a, b, c], None, None).unwrap();
        (m, [a, b, c], f)
    }

    fn mesh_signature(m: &Mesh) -> (Vec<(u32, Vec3)>, Vec<Vec<u32>>) {
        let mut verts: Vec<(u32, Vec3)> = m.iter_verts().map(|(v, vv)| (v.0, vv.co.get())).collect();
        verts.sort_by_key(|(i, _)| *i);
        let mut faces: Vec<Vec<u32>> = m
            .iter_faces()
            .map(|(f, _)| {
                let mut vs: Vec<u32> = m.face_verts(f).iter().map(|v| v.0).collect();
                vs.sort_unstable();
                vs
            })
            .collect();
        faces.sort();
        (verts, faces)
    }

    #[test]
    fn test_undo_face_removal() {
        let (mut m, _, f) = tri();
        let before = mesh_signature(&m);

        let mut log = MemoryLog::new();
        log.entry_push("kill");
        log.face_removed(&m, f);
        m.face_kill(f);
        // Wire edges removed too, logged before their death.
        let wire: Vec<EdgeId> = m.iter_edges().map(|(e, _)| e).collect();
        for e in wire {
            log.edge_removed(&m, e);
            m.edge_kill(e);
        }
        assert_eq!(m.face_count(), 0);
        assert_eq!(m.edge_count(), 0);

        log.undo_all(&mut m).unwrap();
        assert_eq!(mesh_signature(&m), before);
    }

    #[test]
    fn test_undo_edge_split() {
        let (mut m, [a, b, _], f) = tri();
        let before = mesh_signature(&m);

        let mut log = MemoryLog::new();
        log.entry_push("split");
        let e = m.edge_exists(a, b).unwrap();

        // The engine logs the pre-split face record, splits, then re-adds.
        log.face_removed(&m, f);
        let r = log.edge_split(&mut m, e, 0.5).unwrap();
        log.face_added(&m, f);
        assert_eq!(m.face(f).unwrap().len, 4);
        let _ = r;

        // Reverse replay: face killed, halves welded, original face restored.
        log.undo_all(&mut m).unwrap();
        assert_eq!(mesh_signature(&m), before);
        crate::validate::validate(&m, true).unwrap();
    }

    #[test]
    fn test_undo_vert_modify() {
        let (mut m, [a, _, _], _) = tri();
        let mut log = MemoryLog::new();
        log.entry_push("move");
        log.vert_before_modify(&m, a);
        if let Some(v) = m.vert_mut(a) {
            v.co.set(Vec3::splat(9.0));
        }
        log.undo_all(&mut m).unwrap();
        assert_eq!(m.vert_co(a), Vec3::ZERO);
    }
}
