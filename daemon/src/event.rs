use chrono::{DateTime, Local};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::EventKind;
use std::ffi::OsStr;
use std::fmt;
use std::path::PathBuf;

use crate::config::TriggerPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Deleted,
    Modified,
}

impl FileEventKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Deleted => "DELETED",
            Self::Modified => "MODIFIED",
        }
    }

    /// Whether `policy` asks for a flash on this kind of event.
    pub fn triggers_flash(self, policy: &TriggerPolicy) -> bool {
        match self {
            Self::Created => policy.on_create,
            Self::Deleted => policy.on_delete,
            Self::Modified => policy.on_modify,
        }
    }
}

/// A notification that concerns the marker file itself.
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub timestamp: DateTime<Local>,
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - File {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.kind.label(),
            self.path.display()
        )
    }
}

/// Extracts the events in `event` that refer to a file named `file_name`.
///
/// Directory-level notifications and access events are dropped. A rename
/// onto the marker name counts as a creation, a rename away from it as a
/// deletion; each rename is reported once.
pub fn classify(event: &notify::Event, file_name: &OsStr) -> Vec<FileEvent> {
    let timestamp = Local::now();
    let mut out = Vec::new();

    for path in &event.paths {
        let kind = match event.kind {
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
                continue
            }
            EventKind::Create(_) => FileEventKind::Created,
            EventKind::Remove(_) => FileEventKind::Deleted,
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FileEventKind::Created,
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => FileEventKind::Deleted,
            // `Both` repeats the `From`/`To` halves already reported.
            EventKind::Modify(ModifyKind::Name(_)) => continue,
            EventKind::Modify(_) => FileEventKind::Modified,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => continue,
        };

        if path.file_name() != Some(file_name) {
            continue;
        }
        // Backends that cannot tell files from folders report `Any`.
        if kind != FileEventKind::Deleted && path.is_dir() {
            continue;
        }

        out.push(FileEvent {
            path: path.clone(),
            kind,
            timestamp,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, DataChange, MetadataKind};
    use notify::Event;
    use std::path::Path;

    const MARKER: &str = ".cursor_response_complete";

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    fn kinds(events: &[FileEvent]) -> Vec<FileEventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    fn marker() -> &'static OsStr {
        OsStr::new(MARKER)
    }

    // ── kind mapping ──────────────────────────────────────────────────────────

    #[test]
    fn create_file_is_created() {
        let e = event(EventKind::Create(CreateKind::File), &["/w/.cursor_response_complete"]);
        let out = classify(&e, marker());
        assert_eq!(kinds(&out), vec![FileEventKind::Created]);
        assert_eq!(out[0].path, Path::new("/w/.cursor_response_complete"));
    }

    #[test]
    fn remove_file_is_deleted() {
        let e = event(EventKind::Remove(RemoveKind::File), &["/w/.cursor_response_complete"]);
        assert_eq!(kinds(&classify(&e, marker())), vec![FileEventKind::Deleted]);
    }

    #[test]
    fn data_and_metadata_changes_are_modified() {
        for kind in [
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)),
            EventKind::Modify(ModifyKind::Any),
        ] {
            let e = event(kind, &["/w/.cursor_response_complete"]);
            assert_eq!(kinds(&classify(&e, marker())), vec![FileEventKind::Modified]);
        }
    }

    #[test]
    fn access_and_unknown_events_are_ignored() {
        for kind in [
            EventKind::Access(AccessKind::Any),
            EventKind::Any,
            EventKind::Other,
        ] {
            let e = event(kind, &["/w/.cursor_response_complete"]);
            assert!(classify(&e, marker()).is_empty());
        }
    }

    #[test]
    fn folder_events_are_ignored() {
        let created = event(EventKind::Create(CreateKind::Folder), &["/w/.cursor_response_complete"]);
        let removed = event(EventKind::Remove(RemoveKind::Folder), &["/w/.cursor_response_complete"]);
        assert!(classify(&created, marker()).is_empty());
        assert!(classify(&removed, marker()).is_empty());
    }

    #[test]
    fn create_any_on_existing_directory_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join(MARKER);
        std::fs::create_dir(&sub).unwrap();
        let e = Event::new(EventKind::Create(CreateKind::Any)).add_path(sub);
        assert!(classify(&e, marker()).is_empty());
    }

    // ── renames ───────────────────────────────────────────────────────────────

    #[test]
    fn rename_onto_marker_is_created() {
        let e = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/w/.cursor_response_complete"],
        );
        assert_eq!(kinds(&classify(&e, marker())), vec![FileEventKind::Created]);
    }

    #[test]
    fn rename_away_from_marker_is_deleted() {
        let e = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/w/.cursor_response_complete"],
        );
        assert_eq!(kinds(&classify(&e, marker())), vec![FileEventKind::Deleted]);
    }

    #[test]
    fn paired_rename_is_left_to_its_halves() {
        let onto = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/w/tmp.123", "/w/.cursor_response_complete"],
        );
        let away = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/w/.cursor_response_complete", "/w/done.old"],
        );
        assert!(classify(&onto, marker()).is_empty());
        assert!(classify(&away, marker()).is_empty());
    }

    #[test]
    fn rename_sequence_yields_one_event_per_side() {
        let sequence = [
            event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/w/tmp.123"]),
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                &["/w/.cursor_response_complete"],
            ),
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/w/tmp.123", "/w/.cursor_response_complete"],
            ),
        ];
        let all: Vec<FileEvent> = sequence.iter().flat_map(|e| classify(e, marker())).collect();
        assert_eq!(kinds(&all), vec![FileEventKind::Created]);
    }

    // ── basename filter ───────────────────────────────────────────────────────

    #[test]
    fn other_file_names_are_ignored() {
        for path in [
            "/w/other.txt",
            "/w/x.cursor_response_complete",
            "/w/.cursor_response_complete.swp",
        ] {
            let e = event(EventKind::Create(CreateKind::File), &[path]);
            assert!(classify(&e, marker()).is_empty(), "unexpected match for {path}");
        }
    }

    // ── triggers / display ────────────────────────────────────────────────────

    #[test]
    fn default_policy_flashes_only_on_created() {
        let policy = TriggerPolicy::default();
        assert!(FileEventKind::Created.triggers_flash(&policy));
        assert!(!FileEventKind::Deleted.triggers_flash(&policy));
        assert!(!FileEventKind::Modified.triggers_flash(&policy));
    }

    #[test]
    fn toggles_enable_delete_and_modify_flashes() {
        let policy = TriggerPolicy {
            on_create: true,
            on_delete: true,
            on_modify: true,
        };
        assert!(FileEventKind::Deleted.triggers_flash(&policy));
        assert!(FileEventKind::Modified.triggers_flash(&policy));
    }

    #[test]
    fn display_includes_label_and_path() {
        let e = FileEvent {
            path: PathBuf::from("/w/.cursor_response_complete"),
            kind: FileEventKind::Deleted,
            timestamp: Local::now(),
        };
        let line = e.to_string();
        assert!(line.contains(" - File DELETED: /w/.cursor_response_complete"));
    }
}
