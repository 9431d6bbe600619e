//! Table-driven tests for configuration loading and validation.

use std::path::PathBuf;

use wikimport::config::load_config_from_str;
use wikimport::LogFormat;

/// One config document and what loading it should produce.
struct Case {
    name: &'static str,
    json: &'static str,
    /// `None` when loading succeeds, otherwise a substring of the error.
    error: Option<&'static str>,
}

const CASES: &[Case] = &[
    Case {
        name: "empty_object",
        json: "{}",
        error: None,
    },
    Case {
        name: "valid_full",
        json: r#"{
            "images_folder": "media",
            "workspace_folder": "staging",
            "reserved_names": ["home", "sidebar"],
            "file_base_url": "https://wiki.example.com",
            "file_download_path": "/p/{project}/f/{file}",
            "file_render_path": "/p/{project}/f/{file}?inline=1",
            "progress_capacity": 32,
            "database_path": "/var/lib/wikimport/tasks.db",
            "log_format": "json"
        }"#,
        error: None,
    },
    Case {
        name: "null_database_path",
        json: r#"{ "database_path": null }"#,
        error: None,
    },
    Case {
        name: "unknown_field",
        json: r#"{ "output_directory": "/tmp" }"#,
        error: Some("Schema validation failed"),
    },
    Case {
        name: "zero_capacity",
        json: r#"{ "progress_capacity": 0 }"#,
        error: Some("Schema validation failed"),
    },
    Case {
        name: "bad_log_format",
        json: r#"{ "log_format": "xml" }"#,
        error: Some("Schema validation failed"),
    },
    Case {
        name: "duplicate_reserved_names",
        json: r#"{ "reserved_names": ["home", "home"] }"#,
        error: Some("Schema validation failed"),
    },
    Case {
        name: "render_path_without_file",
        json: r#"{ "file_render_path": "/render" }"#,
        error: Some("file_render_path"),
    },
    Case {
        name: "workspace_folder_traversal",
        json: r#"{ "workspace_folder": ".." }"#,
        error: Some("workspace_folder"),
    },
    Case {
        name: "malformed_json",
        json: r#"{ "images_folder": "#,
        error: Some("Failed to parse config JSON"),
    },
];

#[test]
fn test_json_config_loading() {
    for case in CASES {
        match (load_config_from_str(case.json), case.error) {
            (Ok(_), None) => {}
            (Ok(_), Some(expected)) => {
                panic!("{}: loaded, expected an error containing '{}'", case.name, expected)
            }
            (Err(e), None) => panic!("{}: expected success, got {}", case.name, e),
            (Err(e), Some(expected)) => assert!(
                e.to_string().contains(expected),
                "{}: error '{}' does not mention '{}'",
                case.name,
                e,
                expected
            ),
        }
    }
}

#[test]
fn test_valid_config_field_values() {
    let config = load_config_from_str(CASES[1].json).unwrap();

    assert_eq!(config.images_folder, "media");
    assert_eq!(config.reserved_names, vec!["home", "sidebar"]);
    assert_eq!(config.progress_capacity, 32);
    assert_eq!(config.log_format, LogFormat::Json);
    assert_eq!(
        config.database_path(),
        Some(PathBuf::from("/var/lib/wikimport/tasks.db"))
    );
    assert_eq!(
        config.file_url("p1", "doc-1", true),
        "https://wiki.example.com/p/p1/f/doc-1?inline=1"
    );
}
