//! End-to-end filing behavior: directory layout, duplicate handling and
//! collision suffixes against a real temporary tree.

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use invorg::organizer::{FileOrganizer, StoreOutcome};

#[test]
fn files_land_under_company_and_month() {
    let dir = TempDir::new().unwrap();
    let organizer = FileOrganizer::new(dir.path());
    let march = Utc.with_ymd_and_hms(2024, 3, 11, 10, 0, 0).unwrap();

    let record = organizer
        .store("Acme", "email", march, "invoice.pdf", b"%PDF-1.4 acme")
        .unwrap();

    assert_eq!(record.outcome, StoreOutcome::Written);
    assert_eq!(
        record.path,
        dir.path()
            .join("Acme")
            .join("2024-03")
            .join("email_invoice.pdf")
    );
    assert!(record.path.is_file());
}

#[test]
fn same_bytes_same_name_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let organizer = FileOrganizer::new(dir.path());
    let when = Utc.with_ymd_and_hms(2024, 3, 11, 10, 0, 0).unwrap();

    let first = organizer
        .store("Acme", "email", when, "invoice.pdf", b"identical")
        .unwrap();
    let second = organizer
        .store("Acme", "email", when, "invoice.pdf", b"identical")
        .unwrap();

    assert_eq!(second.outcome, StoreOutcome::SkippedDuplicate);
    assert_eq!(second.path, first.path);

    let entries: Vec<_> = std::fs::read_dir(first.path.parent().unwrap())
        .unwrap()
        .collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn same_name_different_bytes_gets_a_suffix() {
    let dir = TempDir::new().unwrap();
    let organizer = FileOrganizer::new(dir.path());
    let when = Utc.with_ymd_and_hms(2024, 3, 11, 10, 0, 0).unwrap();

    organizer
        .store("Acme", "email", when, "invoice.pdf", b"first version")
        .unwrap();
    let second = organizer
        .store("Acme", "email", when, "invoice.pdf", b"second version")
        .unwrap();
    let third = organizer
        .store("Acme", "email", when, "invoice.pdf", b"third version")
        .unwrap();

    assert_eq!(second.outcome, StoreOutcome::RenamedWithSuffix);
    assert_eq!(
        second.path.file_name().unwrap().to_string_lossy(),
        "email_invoice_1.pdf"
    );
    assert_eq!(
        third.path.file_name().unwrap().to_string_lossy(),
        "email_invoice_2.pdf"
    );
}

#[test]
fn duplicate_is_recognized_among_suffixed_variants() {
    let dir = TempDir::new().unwrap();
    let organizer = FileOrganizer::new(dir.path());
    let when = Utc.with_ymd_and_hms(2024, 3, 11, 10, 0, 0).unwrap();

    organizer
        .store("Acme", "email", when, "invoice.pdf", b"first")
        .unwrap();
    organizer
        .store("Acme", "email", when, "invoice.pdf", b"second")
        .unwrap();

    // Re-storing bytes that already live at the suffixed path is a skip,
    // not a third file.
    let repeat = organizer
        .store("Acme", "email", when, "invoice.pdf", b"second")
        .unwrap();
    assert_eq!(repeat.outcome, StoreOutcome::SkippedDuplicate);
    assert_eq!(
        repeat.path.file_name().unwrap().to_string_lossy(),
        "email_invoice_1.pdf"
    );
}

#[test]
fn companies_and_months_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let organizer = FileOrganizer::new(dir.path());
    let march = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let april = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();

    let a = organizer
        .store("Acme", "email", march, "invoice.pdf", b"x")
        .unwrap();
    let b = organizer
        .store("Acme", "email", april, "invoice.pdf", b"x")
        .unwrap();
    let c = organizer
        .store("Globex", "email", march, "invoice.pdf", b"x")
        .unwrap();

    assert_eq!(a.outcome, StoreOutcome::Written);
    assert_eq!(b.outcome, StoreOutcome::Written);
    assert_eq!(c.outcome, StoreOutcome::Written);
    assert_ne!(a.path, b.path);
    assert_ne!(a.path, c.path);
}

#[test]
fn hostile_filenames_are_sanitized_on_disk() {
    let dir = TempDir::new().unwrap();
    let organizer = FileOrganizer::new(dir.path());
    let when = Utc.with_ymd_and_hms(2024, 3, 11, 10, 0, 0).unwrap();

    let record = organizer
        .store("Acme", "email", when, "inv/oice:march?.pdf", b"%PDF-1.4")
        .unwrap();

    let name = record.path.file_name().unwrap().to_string_lossy();
    assert_eq!(name, "email_inv_oice_march_.pdf");
    assert!(record.path.starts_with(dir.path().join("Acme")));
    assert!(record.path.is_file());
}
