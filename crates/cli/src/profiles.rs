//! Built-in profiles.
//!
//! The `files` profile treats its inputs as opaque byte blobs: it knows
//! nothing about font formats and exists to exercise the engine end to end.

use anyhow::Context;
use bakery_core::Value;
use bakery_profile::{
    Check, Condition, DerivedIterable, ExpectedValue, Iterarg, Profile, ProfileCatalog, Result,
    Testable,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Default size above which a file is reported as large.
pub const WARN_SIZE: u64 = 1024 * 1024;

/// Default size above which a file fails.
pub const FAIL_SIZE: u64 = 10 * 1024 * 1024;

/// Catalog of the built-in profiles.
pub fn catalog() -> ProfileCatalog {
    let mut catalog = ProfileCatalog::new();
    catalog.register("files", files_profile);
    catalog
}

fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Generic checks over a collection of files.
pub fn files_profile() -> Result<Profile> {
    let mut profile = Profile::new("files").with_description("Generic checks over opaque files");

    profile.register_expected_value(
        ExpectedValue::new("files", "Paths of the files to check")
            .with_default(Value::List(Vec::new()))
            .with_validator(|value| match value.as_list() {
                Some(_) => Ok(()),
                None => Err("expected a list of paths".to_string()),
            })
            .with_item_validator(|item| match item.as_str() {
                Some(path) if Path::new(path).is_file() => Ok(()),
                Some(path) => Err(format!("{path} is not a readable file")),
                None => Err("expected a path".to_string()),
            }),
    )?;
    profile.register_iterarg(Iterarg::new("file", "files"))?;

    profile.register_condition(
        Condition::from_fn("file_bytes", Testable::Font, ["file"], |args| {
            let path = args.text("file")?;
            let bytes = std::fs::read(path).with_context(|| format!("reading {path}"))?;
            Ok(Value::opaque(bytes))
        })
        .with_description("Contents of the file"),
    )?;
    profile.register_condition(Condition::from_fn(
        "file_size",
        Testable::Font,
        ["file_bytes"],
        |args| {
            let bytes = args.get::<Vec<u8>>("file_bytes")?;
            Ok(Value::Int(i64::try_from(bytes.len())?))
        },
    ))?;
    profile.register_condition(Condition::from_fn("is_empty", Testable::Font, ["file_size"], |args| {
        Ok(Value::Bool(args.int("file_size")? == 0))
    }))?;
    profile.register_condition(Condition::from_fn("extension", Testable::Font, ["file"], |args| {
        Ok(Value::from(extension_of(args.text("file")?)))
    }))?;
    profile.register_derived_iterable(DerivedIterable::new("extensions", "extension", true))?;
    profile.register_alias("size", "file_size")?;

    profile.register_check(
        "Files",
        Check::builder("files/empty")
            .description("Files must not be empty.")
            .testable(Testable::Font)
            .params(["file_size"])
            .severity(10)
            .body_fn(|args, report| {
                if args.int("file_size")? == 0 {
                    report.fail("empty-file", "The file is empty.");
                } else {
                    report.pass("ok", "The file has content.");
                }
                Ok(())
            })
            .build()?,
    )?;

    profile.register_check(
        "Files",
        Check::builder("files/size")
            .description("Files should not be too large.")
            .rationale("Large files are slow to distribute and to load.")
            .testable(Testable::Font)
            .params(["size", "config"])
            .conditions(["not is_empty"])
            .configs(["WARN_SIZE", "FAIL_SIZE"])
            .body_fn(|args, report| {
                let size = u64::try_from(args.int("size")?)?;
                let warn_size = args.config().get_or("WARN_SIZE", WARN_SIZE);
                let fail_size = args.config().get_or("FAIL_SIZE", FAIL_SIZE);
                if size > fail_size {
                    report.fail(
                        "too-large",
                        format!("The file is {size} bytes, more than the limit of {fail_size}."),
                    );
                } else if size > warn_size {
                    report.warn(
                        "large-file",
                        format!("The file is {size} bytes, more than {warn_size}."),
                    );
                } else {
                    report.pass("ok", format!("The file is {size} bytes."));
                }
                Ok(())
            })
            .build()?,
    )?;

    profile.register_check(
        "Family",
        Check::builder("family/extensions")
            .description("Files of a family share one extension.")
            .testable(Testable::Family)
            .params(["extensions"])
            .body_fn(|args, report| {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for ext in args.list("extensions")? {
                    *counts.entry(ext.as_str().unwrap_or_default()).or_default() += 1;
                }
                match counts.len() {
                    0 => report.skip("no-files", "No files were given."),
                    1 => report.pass("ok", "All files share one extension."),
                    _ => {
                        let listed: Vec<String> = counts
                            .iter()
                            .map(|(ext, count)| format!("{ext:?}: {count}"))
                            .collect();
                        report.warn(
                            "mixed-extensions",
                            format!("Files use several extensions: {}", listed.join(", ")),
                        );
                    }
                }
                Ok(())
            })
            .build()?,
    )?;

    profile.register_check(
        "Family",
        Check::builder("family/unique_names")
            .description("File names are unique within the family.")
            .testable(Testable::Family)
            .params(["files"])
            .body_fn(|args, report| {
                let mut seen = BTreeMap::new();
                for path in args.list("files")?.iter().filter_map(Value::as_str) {
                    let name = Path::new(path)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    *seen.entry(name).or_insert(0usize) += 1;
                }
                let duplicates: Vec<&String> = seen
                    .iter()
                    .filter(|(_, count)| **count > 1)
                    .map(|(name, _)| name)
                    .collect();
                if duplicates.is_empty() {
                    report.pass("ok", "File names are unique.");
                } else {
                    for name in duplicates {
                        report.fail("duplicate-name", format!("{name} appears more than once."));
                    }
                }
                Ok(())
            })
            .build()?,
    )?;

    profile.set_configuration_defaults(
        "files/size",
        serde_json::json!({"WARN_SIZE": WARN_SIZE, "FAIL_SIZE": FAIL_SIZE}),
    );

    Ok(profile)
}
