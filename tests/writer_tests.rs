use anyhow::Result;
use mpgw_convert::writer::{
    RAW_OUTPUT_PATH, WriteAction, WriteError, WriteOptions, extract_files, parse_llm_json,
    safe_write_files, save_raw_output,
};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;

use test_utils::{setup_repo, write_file};

const WRITE: WriteOptions = WriteOptions {
    dry_run: false,
    force: false,
};

fn entries(value: &Value) -> Vec<Value> {
    extract_files(value)
        .expect("payload should carry a files list")
        .clone()
}

fn list_tree(root: &Path) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).expect("readable directory") {
            let path = entry.expect("directory entry").path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            found.push(
                path.strip_prefix(root)
                    .expect("path under root")
                    .display()
                    .to_string(),
            );
        }
    }
    found.sort();
    found
}

#[test]
fn test_writes_files_under_repo_root() -> Result<()> {
    let temp_dir = setup_repo();
    let payload = json!({
        "summary": "ported",
        "files": [
            {"path": "Target/payments/PaymentsGW/route.js", "content": "// js\n"},
            {"path": "Target/payments/PaymentsGW/xsl/map.xsl", "content": "<xsl/>"}
        ]
    });

    let actions = safe_write_files(temp_dir.path(), &entries(&payload), WRITE)?;

    assert_eq!(
        actions,
        vec![
            WriteAction::Written {
                path: "Target/payments/PaymentsGW/route.js".to_string(),
                size: 6,
            },
            WriteAction::Written {
                path: "Target/payments/PaymentsGW/xsl/map.xsl".to_string(),
                size: 6,
            },
        ]
    );
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("Target/payments/PaymentsGW/route.js"))?,
        "// js\n"
    );
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("Target/payments/PaymentsGW/xsl/map.xsl"))?,
        "<xsl/>"
    );
    Ok(())
}

#[test]
fn test_rejects_path_traversal() {
    let temp_dir = setup_repo();
    let repo = temp_dir.path().join("repo");
    fs::create_dir_all(&repo).expect("Failed to create repo dir");
    let files = vec![json!({"path": "../../etc/passwd", "content": "root::0:0"})];

    let result = safe_write_files(&repo, &files, WRITE);

    assert!(matches!(result, Err(WriteError::OutsideRepo(ref p)) if p == "../../etc/passwd"));
    assert!(list_tree(&repo).is_empty());
    assert!(!temp_dir.path().join("etc").exists());
}

#[test]
fn test_rejects_absolute_and_sneaky_paths() {
    let temp_dir = setup_repo();
    let repo = temp_dir.path().join("repo");
    fs::create_dir_all(&repo).expect("Failed to create repo dir");
    let outside = temp_dir.path().join("outside.txt");

    for path in [
        outside.display().to_string(),
        "Target/../../outside.txt".to_string(),
        "Target/./../..".to_string(),
    ] {
        let files = vec![json!({"path": path, "content": "x"})];
        let result = safe_write_files(&repo, &files, WRITE);
        assert!(
            matches!(result, Err(WriteError::OutsideRepo(_))),
            "expected {path} to be rejected"
        );
    }
    assert!(!outside.exists());
}

#[cfg(unix)]
#[test]
fn test_rejects_symlink_escaping_repo() {
    let temp_dir = setup_repo();
    let repo = temp_dir.path().join("repo");
    let elsewhere = temp_dir.path().join("elsewhere");
    fs::create_dir_all(&repo).expect("Failed to create repo dir");
    fs::create_dir_all(&elsewhere).expect("Failed to create target dir");
    std::os::unix::fs::symlink(&elsewhere, repo.join("link")).expect("Failed to symlink");

    let files = vec![json!({"path": "link/escaped.txt", "content": "x"})];
    let result = safe_write_files(&repo, &files, WRITE);

    assert!(matches!(result, Err(WriteError::OutsideRepo(_))));
    assert!(!elsewhere.join("escaped.txt").exists());
}

#[test]
fn test_dry_run_touches_nothing() -> Result<()> {
    let temp_dir = setup_repo();
    let files = vec![
        json!({"path": "Target/visa/a.js", "content": "a"}),
        json!({"path": "Target/visa/b.xsl", "content": "bb"}),
    ];

    let actions = safe_write_files(
        temp_dir.path(),
        &files,
        WriteOptions {
            dry_run: true,
            force: false,
        },
    )?;

    assert_eq!(
        actions,
        vec![
            WriteAction::Planned {
                path: "Target/visa/a.js".to_string(),
                size: 1,
            },
            WriteAction::Planned {
                path: "Target/visa/b.xsl".to_string(),
                size: 2,
            },
        ]
    );
    assert_eq!(
        actions.iter().map(ToString::to_string).collect::<Vec<_>>(),
        vec![
            "[dry-run] would write: Target/visa/a.js (1 bytes)",
            "[dry-run] would write: Target/visa/b.xsl (2 bytes)",
        ]
    );
    assert!(list_tree(temp_dir.path()).is_empty());
    Ok(())
}

#[test]
fn test_reported_size_counts_characters() -> Result<()> {
    let temp_dir = setup_repo();
    let files = vec![json!({"path": "Target/visa/accents.js", "content": "héllo"})];

    let planned = safe_write_files(
        temp_dir.path(),
        &files,
        WriteOptions {
            dry_run: true,
            force: false,
        },
    )?;
    let written = safe_write_files(temp_dir.path(), &files, WRITE)?;

    assert_eq!(
        planned[0].to_string(),
        "[dry-run] would write: Target/visa/accents.js (5 bytes)"
    );
    assert_eq!(written[0].to_string(), "[write] Target/visa/accents.js");
    assert!(matches!(written[0], WriteAction::Written { size: 5, .. }));
    Ok(())
}

#[test]
fn test_existing_file_requires_force_at_any_position() {
    for position in 0..3 {
        let temp_dir = setup_repo();
        write_file(temp_dir.path(), "Target/visa/existing.js", "original");

        let mut files = vec![
            json!({"path": "Target/visa/first.js", "content": "1"}),
            json!({"path": "Target/visa/second.js", "content": "2"}),
        ];
        files.insert(
            position,
            json!({"path": "Target/visa/existing.js", "content": "replacement"}),
        );

        let result = safe_write_files(temp_dir.path(), &files, WRITE);

        assert!(
            matches!(result, Err(WriteError::AlreadyExists(ref p)) if p == "Target/visa/existing.js"),
            "position {position}"
        );
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("Target/visa/existing.js"))
                .expect("existing file readable"),
            "original"
        );
        // Entries ahead of the failing one are already on disk
        assert_eq!(
            temp_dir.path().join("Target/visa/first.js").exists(),
            position > 0
        );
    }
}

#[test]
fn test_existing_file_blocks_dry_run_too() {
    let temp_dir = setup_repo();
    write_file(temp_dir.path(), "Target/visa/existing.js", "original");
    let files = vec![json!({"path": "Target/visa/existing.js", "content": "new"})];

    let result = safe_write_files(
        temp_dir.path(),
        &files,
        WriteOptions {
            dry_run: true,
            force: false,
        },
    );
    assert!(matches!(result, Err(WriteError::AlreadyExists(_))));
}

#[test]
fn test_force_overwrites_existing_file() -> Result<()> {
    let temp_dir = setup_repo();
    write_file(temp_dir.path(), "Target/visa/existing.js", "original");
    let files = vec![json!({"path": "Target/visa/existing.js", "content": "replacement"})];

    safe_write_files(
        temp_dir.path(),
        &files,
        WriteOptions {
            dry_run: false,
            force: true,
        },
    )?;

    assert_eq!(
        fs::read_to_string(temp_dir.path().join("Target/visa/existing.js"))?,
        "replacement"
    );
    Ok(())
}

#[test]
fn test_invalid_entry_stops_batch() {
    let temp_dir = setup_repo();
    let files = vec![
        json!({"path": "Target/visa/ok.js", "content": "ok"}),
        json!({"path": "Target/visa/bad.js"}),
        json!({"path": "Target/visa/never.js", "content": "never"}),
    ];

    let result = safe_write_files(temp_dir.path(), &files, WRITE);

    assert!(matches!(result, Err(WriteError::InvalidContent(ref p)) if p == "Target/visa/bad.js"));
    assert!(temp_dir.path().join("Target/visa/ok.js").exists());
    assert!(!temp_dir.path().join("Target/visa/never.js").exists());
}

#[test]
fn test_parse_response_with_leading_text() -> Result<()> {
    let raw = "Here is the converted service:\n\n{\"summary\": \"done\", \"files\": [{\"path\": \"Target/visa/a.js\", \"content\": \"x\"}]}\n";

    let payload = parse_llm_json(raw)?;

    assert_eq!(payload["summary"], "done");
    assert_eq!(entries(&payload).len(), 1);
    Ok(())
}

#[test]
fn test_save_raw_output_uses_fixed_path() -> Result<()> {
    let temp_dir = setup_repo();

    let saved = save_raw_output(temp_dir.path(), "not json at all")?;

    assert_eq!(saved, temp_dir.path().join(RAW_OUTPUT_PATH));
    assert_eq!(fs::read_to_string(saved)?, "not json at all");
    Ok(())
}
