//! Library-level tests against the `trips` fixture vault.

use pretty_assertions::assert_eq;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use vaultnote::store::FileStamp;
use vaultnote::{Config, Document, FieldValue, FsStore, NoteStore, Operation, TaskRef, Vault, VaultError};

fn fixture_path(name: &str) -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent()
        .unwrap()
        .join("fixtures")
        .join(name)
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), target).unwrap();
        }
    }
}

/// A writable copy of a fixture vault.
fn fixture_copy(name: &str) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    copy_dir(&fixture_path(name), temp_dir.path());
    temp_dir
}

fn markdown_files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            found.extend(markdown_files(&path));
        } else if path.extension().is_some_and(|e| e == "md") {
            found.push(path);
        }
    }
    found
}

fn backups(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|e| e == "bak"))
        .collect()
}

mod round_trip {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_fixture_serializes_to_its_own_bytes() {
        let files = markdown_files(&fixture_path("trips"));
        assert!(files.len() >= 7);
        for file in files {
            let text = fs::read_to_string(&file).unwrap();
            let doc = Document::parse(&text);
            assert_eq!(doc.serialize(), text, "round trip failed for {}", file.display());
        }
    }

    #[test]
    fn unclosed_header_degrades_to_body() {
        let vault = Vault::new(fixture_path("trips")).unwrap();
        let doc = vault.document("broken.md").unwrap();
        assert!(!doc.header().is_present());
        assert!(doc.tags().is_empty());
        assert!(!doc.issues().is_empty());
        assert_eq!(doc.flat_tasks().len(), 1);
    }
}

mod structure {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nesting_follows_indentation() {
        let doc = Document::parse("- [ ] a\n  - [ ] b\n  - [ ] c\n    - [ ] d\n- [ ] e\n");
        let depths: Vec<usize> = doc.flat_tasks().iter().map(|t| t.depth).collect();
        assert_eq!(depths, vec![0, 1, 1, 2, 0]);
    }

    #[test]
    fn fixture_task_tree() {
        let vault = Vault::new(fixture_path("trips")).unwrap();
        let doc = vault.document("projects/deep").unwrap();

        let depths: Vec<(String, usize)> = doc
            .flat_tasks()
            .iter()
            .map(|t| (t.text.clone(), t.depth))
            .collect();
        assert_eq!(
            depths,
            vec![
                ("a".to_string(), 0),
                ("b".to_string(), 1),
                ("c".to_string(), 1),
                ("d".to_string(), 2),
                ("e".to_string(), 0),
                ("star marker".to_string(), 0),
                ("plus marker".to_string(), 0),
            ]
        );

        // Near misses and fenced checklists are not tasks.
        assert_eq!(doc.tasks_in_section("Near misses").map(|t| t.len()), Some(0));
        assert_eq!(doc.issues().len(), 3);

        let stats = vault.task_stats("projects/deep.md").unwrap();
        assert_eq!((stats.total, stats.completed, stats.pending), (7, 2, 5));
    }

    #[test]
    fn header_fields() {
        let vault = Vault::new(fixture_path("trips")).unwrap();
        assert_eq!(
            vault.get_metadata("lisbon", "title").unwrap(),
            Some(FieldValue::Scalar("Lisbon offsite".to_string()))
        );
        assert_eq!(
            vault.get_metadata("lisbon", "status").unwrap(),
            Some(FieldValue::Scalar("planning".to_string()))
        );
        assert_eq!(
            vault.get_metadata("lisbon", "attendees").unwrap(),
            Some(FieldValue::List(vec!["ana".to_string(), "joão".to_string()]))
        );
        assert!(matches!(
            vault.get_metadata("lisbon", "extra").unwrap(),
            Some(FieldValue::Raw(_))
        ));
        assert_eq!(vault.get_metadata("inbox", "status").unwrap(), None);
    }
}

mod lookup {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paths(found: Vec<vaultnote::DocumentRef>) -> Vec<PathBuf> {
        found.into_iter().map(|d| d.path).collect()
    }

    #[test]
    fn tag_lookup_is_exact() {
        let vault = Vault::new(fixture_path("trips")).unwrap();
        let found = paths(vault.find_documents("trip").unwrap());
        assert_eq!(found, vec![PathBuf::from("crlf.md"), PathBuf::from("lisbon.md")]);

        let found = paths(vault.find_documents("#trip-planning").unwrap());
        assert_eq!(found, vec![PathBuf::from("trip-planning.md")]);

        assert!(vault.find_documents("Trip").unwrap().is_empty());
        assert!(matches!(vault.find_documents("  "), Err(VaultError::InvalidInput(_))));
    }

    #[test]
    fn block_list_tags_are_indexed() {
        let vault = Vault::new(fixture_path("trips")).unwrap();
        let found = paths(vault.find_documents("work").unwrap());
        assert_eq!(found, vec![PathBuf::from("projects/deep.md")]);
    }

    #[test]
    fn hidden_directories_are_skipped() {
        let vault = Vault::new(fixture_path("trips")).unwrap();
        let notes = vault.list_notes().unwrap();
        assert_eq!(notes.len(), 6);
        assert!(notes.iter().all(|p| !p.starts_with(".obsidian")));
    }

    #[test]
    fn compound_queries() {
        let vault = Vault::new(fixture_path("trips")).unwrap();

        let found = paths(vault.query("tag:trip property:status=open").unwrap());
        assert_eq!(found, vec![PathBuf::from("crlf.md")]);

        let found = paths(vault.query("tag:trip -tag:business").unwrap());
        assert_eq!(found, vec![PathBuf::from("crlf.md")]);

        let found = paths(vault.query("tasks:done").unwrap());
        assert!(found.is_empty());

        let found = paths(vault.query("date:2026-03-01..2026-03-31").unwrap());
        assert_eq!(found, vec![PathBuf::from("lisbon.md")]);

        let found = paths(vault.query("tag:(project OR business) tasks:pending").unwrap());
        assert_eq!(found, vec![PathBuf::from("lisbon.md"), PathBuf::from("projects/deep.md")]);

        let found = paths(vault.query("content:/odd +spacing/").unwrap());
        assert_eq!(found, vec![PathBuf::from("lisbon.md")]);
    }

    #[test]
    fn malformed_query_is_rejected() {
        let vault = Vault::new(fixture_path("trips")).unwrap();
        for bad in ["tag:", "(tag:trip", "date:2026-05-01..2026-01-01", "colour:red"] {
            assert!(
                matches!(vault.query(bad), Err(VaultError::QueryError(_))),
                "expected a query error for {bad:?}"
            );
        }
    }

    #[test]
    fn vault_wide_stats() {
        let vault = Vault::new(fixture_path("trips")).unwrap();
        let stats = vault.vault_stats().unwrap();
        assert_eq!(stats.notes, 6);
        assert_eq!(stats.notes_with_tasks, 6);
        assert_eq!(stats.notes_with_issues, 2);
        assert_eq!(stats.tasks.total, 3 + 1 + 2 + 1 + 7 + 1);
        assert_eq!(stats.tasks.completed, 1 + 1 + 2);
    }
}

mod mutations {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCENARIO: &str = "---\ntags: [trip, business]\n---\n## Tasks\n- [ ] book flight\n  - [ ] window seat\n";

    #[test]
    fn add_task_appends_a_root() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("trip.md"), SCENARIO).unwrap();
        let vault = Vault::new(temp_dir.path()).unwrap();

        let outcome = vault
            .mutate(
                "trip.md",
                &Operation::AddTask {
                    section: "Tasks".to_string(),
                    text: "pack bags".to_string(),
                    depth: 0,
                },
            )
            .unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.task.as_ref().map(|t| t.line), Some(6));

        let written = fs::read_to_string(temp_dir.path().join("trip.md")).unwrap();
        assert_eq!(written, format!("{SCENARIO}- [ ] pack bags\n"));

        let roots: Vec<String> = vault.get_tasks("trip").unwrap().into_iter().map(|t| t.text).collect();
        assert_eq!(roots, vec!["book flight", "pack bags"]);
        assert_eq!(backups(temp_dir.path()).len(), 1);
    }

    #[test]
    fn set_metadata_on_headerless_note() {
        let temp_dir = TempDir::new().unwrap();
        let body = "# Inbox\n\n- [ ] call the plumber\n";
        fs::write(temp_dir.path().join("inbox.md"), body).unwrap();
        let vault = Vault::new(temp_dir.path()).unwrap();

        vault
            .mutate(
                "inbox",
                &Operation::SetMetadata {
                    key: "status".to_string(),
                    value: FieldValue::Scalar("done".to_string()),
                },
            )
            .unwrap();

        let written = fs::read_to_string(temp_dir.path().join("inbox.md")).unwrap();
        assert_eq!(written, format!("---\nstatus: done\n---\n{body}"));
        assert_eq!(vault.get_tasks("inbox").unwrap().len(), 1);
    }

    #[test]
    fn toggling_twice_restores_the_note() {
        let temp_dir = fixture_copy("trips");
        let vault = Vault::new(temp_dir.path()).unwrap();
        let original = fs::read_to_string(temp_dir.path().join("lisbon.md")).unwrap();

        let doc = vault.document("lisbon").unwrap();
        let task = TaskRef::from(doc.find_task("book flight", None).unwrap());
        drop(doc);

        let op = Operation::ToggleTask { task, checked: None };
        vault.mutate("lisbon", &op).unwrap();
        let toggled = fs::read_to_string(temp_dir.path().join("lisbon.md")).unwrap();
        assert_eq!(toggled, original.replace("- [ ] book flight", "- [x] book flight"));

        vault.mutate("lisbon", &op).unwrap();
        assert_eq!(fs::read_to_string(temp_dir.path().join("lisbon.md")).unwrap(), original);
    }

    #[test]
    fn repeated_set_metadata_is_a_no_op() {
        let temp_dir = fixture_copy("trips");
        let vault = Vault::new(temp_dir.path()).unwrap();
        let op = Operation::SetMetadata {
            key: "status".to_string(),
            value: FieldValue::Scalar("booked".to_string()),
        };

        let first = vault.mutate("lisbon", &op).unwrap();
        let once = fs::read_to_string(temp_dir.path().join("lisbon.md")).unwrap();
        let second = vault.mutate("lisbon", &op).unwrap();
        let twice = fs::read_to_string(temp_dir.path().join("lisbon.md")).unwrap();

        assert!(first.changed);
        assert!(!second.changed);
        assert!(second.backup.is_none());
        assert_eq!(once, twice);
        // The trailing comment survives a value change.
        assert!(once.contains("status: booked   # revisit after budget call\n"));
    }

    #[test]
    fn edits_keep_crlf_line_endings() {
        let temp_dir = fixture_copy("trips");
        let vault = Vault::new(temp_dir.path()).unwrap();
        vault
            .mutate(
                "crlf",
                &Operation::AddTask {
                    section: "Tasks".to_string(),
                    text: "find hat".to_string(),
                    depth: 0,
                },
            )
            .unwrap();

        let written = fs::read_to_string(temp_dir.path().join("crlf.md")).unwrap();
        assert!(written.ends_with("- [ ] buy sunscreen\r\n- [ ] find hat\r\n"));
        assert!(!written.replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn stale_task_reference_is_refused() {
        let temp_dir = fixture_copy("trips");
        let vault = Vault::new(temp_dir.path()).unwrap();

        let doc = vault.document("lisbon").unwrap();
        let task = TaskRef::from(doc.find_task("reserve hotel", None).unwrap());
        drop(doc);

        // A new header field shifts every body line down by one.
        vault
            .mutate(
                "lisbon",
                &Operation::SetMetadata {
                    key: "budget".to_string(),
                    value: FieldValue::Scalar("1200".to_string()),
                },
            )
            .unwrap();
        let before = fs::read_to_string(temp_dir.path().join("lisbon.md")).unwrap();

        let err = vault
            .mutate("lisbon", &Operation::ToggleTask { task, checked: Some(false) })
            .unwrap_err();
        assert!(matches!(err, VaultError::TaskRefStale { .. }));
        assert_eq!(fs::read_to_string(temp_dir.path().join("lisbon.md")).unwrap(), before);
    }

    #[test]
    fn paths_outside_the_vault_are_refused() {
        let temp_dir = fixture_copy("trips");
        let vault = Vault::new(temp_dir.path()).unwrap();
        let op = Operation::RemoveMetadata {
            key: "status".to_string(),
        };
        assert!(matches!(
            vault.mutate("../elsewhere.md", &op),
            Err(VaultError::OutsideVault(_))
        ));
        assert!(matches!(vault.mutate("missing.md", &op), Err(VaultError::NoteNotFound(_))));
    }

    #[test]
    fn index_sees_edits() {
        let temp_dir = fixture_copy("trips");
        let vault = Vault::new(temp_dir.path()).unwrap();
        assert_eq!(vault.find_documents("errand").unwrap().len(), 1);

        vault
            .mutate(
                "lisbon",
                &Operation::SetMetadata {
                    key: "tags".to_string(),
                    value: FieldValue::List(vec!["trip".to_string(), "errand".to_string()]),
                },
            )
            .unwrap();
        assert_eq!(vault.find_documents("errand").unwrap().len(), 2);

        // Edits made behind the engine's back are picked up too.
        fs::write(temp_dir.path().join("inbox.md"), "---\ntags: [errand]\n---\n").unwrap();
        assert_eq!(vault.find_documents("errand").unwrap().len(), 3);
    }
}

mod atomicity {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Leaves a partial file behind and then reports a failed write.
    struct FailingStore;

    impl NoteStore for FailingStore {
        fn read(&self, path: &Path) -> io::Result<String> {
            FsStore.read(path)
        }
        fn stamp(&self, path: &Path) -> io::Result<FileStamp> {
            FsStore.stamp(path)
        }
        fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
            FsStore.copy(from, to)
        }
        fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
            if path.extension().is_some_and(|e| e == "bak") {
                return FsStore.write_atomic(path, contents);
            }
            fs::write(path, "---\ntags: [tr")?;
            Err(io::Error::other("device went away"))
        }
        fn exists(&self, path: &Path) -> bool {
            FsStore.exists(path)
        }
    }

    #[test]
    fn failed_write_leaves_original_and_backup() {
        let temp_dir = fixture_copy("trips");
        let vault = Vault::with_store(temp_dir.path(), Config::default(), Arc::new(FailingStore)).unwrap();
        let original = fs::read_to_string(temp_dir.path().join("lisbon.md")).unwrap();

        let err = vault
            .mutate(
                "lisbon",
                &Operation::AppendText {
                    section: "Notes".to_string(),
                    text: "Bring adapters.".to_string(),
                },
            )
            .unwrap_err();

        let VaultError::WriteFailure { backup, .. } = err else {
            panic!("expected a write failure, got {err:?}");
        };
        assert_eq!(fs::read_to_string(temp_dir.path().join("lisbon.md")).unwrap(), original);
        assert_eq!(fs::read_to_string(&backup).unwrap(), original);
        assert_eq!(backups(temp_dir.path()), vec![backup]);

        // Queries still see the intact note.
        assert_eq!(vault.find_documents("business").unwrap().len(), 1);
    }
}

mod concurrency {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Barrier;
    use std::time::{Duration, Instant};

    /// Delays note reads and note writes; backups go through untouched.
    #[derive(Default)]
    struct SlowStore {
        read_delay: Duration,
        write_delay: Duration,
        writing: AtomicBool,
    }

    impl NoteStore for SlowStore {
        fn read(&self, path: &Path) -> io::Result<String> {
            thread::sleep(self.read_delay);
            FsStore.read(path)
        }
        fn stamp(&self, path: &Path) -> io::Result<FileStamp> {
            FsStore.stamp(path)
        }
        fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
            FsStore.copy(from, to)
        }
        fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
            if path.extension().is_some_and(|e| e == "md") {
                self.writing.store(true, Ordering::SeqCst);
                thread::sleep(self.write_delay);
            }
            FsStore.write_atomic(path, contents)
        }
        fn exists(&self, path: &Path) -> bool {
            FsStore.exists(path)
        }
    }

    fn two_notes() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.md"), "---\ntags: [alpha]\n---\n## Tasks\n- [ ] one\n").unwrap();
        fs::write(temp_dir.path().join("b.md"), "---\ntags: [beta]\n---\n## Tasks\n- [ ] two\n").unwrap();
        temp_dir
    }

    #[test]
    fn reads_do_not_wait_for_a_write_to_another_note() {
        let temp_dir = two_notes();
        let store = Arc::new(SlowStore {
            write_delay: Duration::from_millis(800),
            ..Default::default()
        });
        let vault = Arc::new(Vault::with_store(temp_dir.path(), Config::default(), store.clone()).unwrap());
        assert_eq!(vault.find_documents("alpha").unwrap().len(), 1);
        assert_eq!(vault.get_tasks("b").unwrap().len(), 1);

        let writer = {
            let vault = Arc::clone(&vault);
            thread::spawn(move || {
                vault
                    .mutate(
                        "a",
                        &Operation::AddTask {
                            section: "Tasks".to_string(),
                            text: "later".to_string(),
                            depth: 0,
                        },
                    )
                    .unwrap()
            })
        };
        while !store.writing.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(5));
        }

        let started = Instant::now();
        assert_eq!(vault.get_tasks("b").unwrap()[0].text, "two");
        assert_eq!(vault.find_documents("beta").unwrap().len(), 1);
        assert!(
            started.elapsed() < Duration::from_millis(400),
            "reads of b.md took {:?}",
            started.elapsed()
        );

        assert!(writer.join().unwrap().changed);
        assert_eq!(vault.get_tasks("a").unwrap().len(), 2);
    }

    #[test]
    fn readers_of_one_note_run_together() {
        let temp_dir = two_notes();
        let store = Arc::new(SlowStore {
            read_delay: Duration::from_millis(400),
            ..Default::default()
        });
        let vault = Arc::new(Vault::with_store(temp_dir.path(), Config::default(), store).unwrap());
        let barrier = Arc::new(Barrier::new(2));

        let started = Instant::now();
        let readers: Vec<_> = (0..2)
            .map(|_| {
                let vault = Arc::clone(&vault);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    vault.task_stats("a").unwrap().total
                })
            })
            .collect();
        for reader in readers {
            assert_eq!(reader.join().unwrap(), 1);
        }
        assert!(
            started.elapsed() < Duration::from_millis(750),
            "two reads of a.md took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn concurrent_adds_to_one_note_are_all_kept() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("list.md"), "## Tasks\n- [ ] first\n").unwrap();
        let vault = Arc::new(Vault::new(temp_dir.path()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let vault = Arc::clone(&vault);
                thread::spawn(move || {
                    vault
                        .mutate(
                            "list",
                            &Operation::AddTask {
                                section: "Tasks".to_string(),
                                text: format!("item {n}"),
                                depth: 0,
                            },
                        )
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().changed);
        }

        let mut texts: Vec<String> = vault.get_tasks("list").unwrap().into_iter().map(|t| t.text).collect();
        texts.sort();
        let mut expected: Vec<String> = (0..8).map(|n| format!("item {n}")).collect();
        expected.push("first".to_string());
        expected.sort();
        assert_eq!(texts, expected);
        assert_eq!(backups(temp_dir.path()).len(), 8);
    }

    #[test]
    fn concurrent_edits_to_different_notes() {
        let temp_dir = fixture_copy("trips");
        let vault = Arc::new(Vault::new(temp_dir.path()).unwrap());

        let handles: Vec<_> = ["lisbon", "crlf", "inbox", "trip-planning"]
            .into_iter()
            .map(|note| {
                let vault = Arc::clone(&vault);
                thread::spawn(move || {
                    for n in 0..5 {
                        vault
                            .mutate(
                                note,
                                &Operation::SetMetadata {
                                    key: "revision".to_string(),
                                    value: FieldValue::Scalar(n.to_string()),
                                },
                            )
                            .unwrap();
                        vault.find_documents("trip").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for note in ["lisbon", "crlf", "inbox", "trip-planning"] {
            assert_eq!(
                vault.get_metadata(note, "revision").unwrap(),
                Some(FieldValue::Scalar("4".to_string()))
            );
        }
    }
}
