use deltrack_common::layout::ProjectLayout;
use deltrack_common::table::{
    parse_table, render_table, DELETION_LOG_HEADER, REPORT_HEADER, SNAPSHOT_HEADER,
};
use deltrack_common::types::{DeletedItem, DeletionRecord, SnapshotRecord};

// Other tools read these files; headers and paths are a fixed contract.

#[test]
fn headers_are_fixed() {
    assert_eq!(DELETION_LOG_HEADER, "Project Name,Element ID,Time,User");
    assert_eq!(SNAPSHOT_HEADER, "Project Name,Element ID,Element Type,Element Name,Level");
    assert_eq!(
        REPORT_HEADER,
        "Project Name,Element ID,Element Type,Element Name,Level,Time,User"
    );
}

#[test]
fn layout_paths_follow_project_and_prefix() {
    let layout = ProjectLayout::new("/share", "Tower", "AR");
    assert_eq!(layout.folder_name(), "Tower_AR");
    assert!(layout.deletion_log_path().ends_with("Tower_AR/SourceTables/Tower_AR.csv"));
    assert!(layout.snapshot_path().ends_with("Tower_AR/SourceTables/Tower_AR_Db.csv"));
    assert!(layout.report_path().ends_with("Tower_AR/Tower_ARDeleted.csv"));
}

#[test]
fn report_written_by_one_version_reads_back_in_order() {
    let deletion = DeletionRecord {
        project_name: "Tower".into(),
        timestamp: "2024-05-01 09:30:00".into(),
        element_id: 42,
        user_name: "bob".into(),
    };
    let snapshot = SnapshotRecord {
        project_name: "Tower".into(),
        element_id: 42,
        element_type: "Walls".into(),
        element_name: "Basic Wall, 200mm".into(),
        level: "L1".into(),
    };
    let items = vec![DeletedItem::join(&deletion, &snapshot)];

    let rendered = render_table(&items).expect("rendering to memory succeeds");
    assert_eq!(
        rendered,
        format!(
            "{REPORT_HEADER}\nTower,42,Walls,\"Basic Wall, 200mm\",L1,2024-05-01 09:30:00,bob\n"
        )
    );

    let parsed = parse_table::<DeletedItem>(&rendered);
    assert!(parsed.rejected.is_empty());
    assert_eq!(parsed.rows, items);
}

#[test]
fn hand_edited_log_with_crlf_and_bom_still_parses() {
    let contents = "\u{feff}Project Name,Element ID,Time,User\r\nTower,7,2024-05-01 09:30:00,bob\r\n\r\nTower,x,2024-05-01 09:31:00,bob\r\n";
    let parsed = parse_table::<DeletionRecord>(contents);
    assert_eq!(parsed.rows.len(), 1);
    assert_eq!(parsed.rows[0].element_id, 7);
    assert_eq!(parsed.rejected.len(), 1);
    assert_eq!(parsed.rejected[0].line(), 4);
}
