// Integration tests for autopart
//
// These tests drive the public planning API end to end:
// - request files are loaded, validated and planned
// - layout-level properties hold for every strategy
// - disk selection prefers non-destructive strategies

use autopart::{
    plan_layout, Disk, DiskLabel, DesiredPartition, ExistingPartition, KeepList, Layout, NoShrink,
    PartitionKind, PlanMode, PlanOptions, PlanRequest, ProbedShrinkOracle, ShrinkEstimate, SizePolicy,
};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

fn empty(device: &str, cylinders: u64) -> Disk {
    Disk::new(device, DiskLabel::Msdos, MIB, cylinders)
}

fn plan(disks: &[Disk], desired: &[DesiredPartition]) -> Layout {
    plan_layout(disks, desired, &PlanOptions::default(), &ProbedShrinkOracle).expect("feasible layout")
}

// =============================================================================
// Request files
// =============================================================================

#[test]
fn test_request_from_json() {
    let json = r#"{
        "disks": [{
            "device": "/dev/sda",
            "cylinder_size": 1048576,
            "cylinders": 2000,
            "label": "msdos",
            "max_primary": 4,
            "max_logical": 60,
            "extended_supported": true,
            "partitions": [
                { "number": 1, "start": 0, "length": 1000, "fsid": 7, "filesystem": "ntfs" }
            ]
        }],
        "partitions": [
            { "mount": "swap", "size": { "fixed": 104857600 } },
            { "mount": "/", "size": "max", "filesystem": "btrfs" }
        ],
        "options": { "ram_bytes": 2147483648 }
    }"#;

    let dir = tempfile::tempdir().expect("tempdir"); // test: tmpfs available
    let path = dir.path().join("request.json");
    std::fs::write(&path, json).expect("write request");

    let request = PlanRequest::load_from_file(&path).expect("parse request");
    request.validate().expect("valid request");
    assert!(request.partitions.iter().all(|p| p.format));
    assert!(!request.options.prefer_remove);

    let layout = plan_layout(&request.disks, &request.partitions, &request.options, &NoShrink)
        .expect("feasible layout");
    assert_eq!(layout.mode, PlanMode::Free);
    // Windows untouched; swap and root in the free half
    assert_eq!(layout.records.len(), 2);
    assert!(layout.records.iter().all(|r| r.start >= 1000 && r.create));
}

#[test]
fn test_invalid_request_rejected() {
    let mut request = PlanRequest::new(
        vec![empty("/dev/sda", 1000)],
        vec![DesiredPartition::new("/", SizePolicy::Percent(150))],
    );
    assert!(request.validate().is_err());

    request.partitions = vec![DesiredPartition::new("/", SizePolicy::Fixed(0))];
    assert!(request.validate().is_err());

    request.partitions = vec![DesiredPartition::new("/", SizePolicy::Max)];
    request.disks[0].cylinder_size = 0;
    assert!(request.validate().is_err());
}

#[test]
fn test_overlapping_partitions_rejected() {
    let disk = empty("/dev/sda", 1000)
        .with_partition(ExistingPartition::new(1, 0, 500, 0x83))
        .with_partition(ExistingPartition::new(2, 400, 200, 0x83));
    let request = PlanRequest::new(vec![disk], vec![DesiredPartition::new("/", SizePolicy::Max)]);
    assert!(request.validate().is_err());
}

// =============================================================================
// Layout properties
// =============================================================================

#[test]
fn test_zero_desired_partitions() {
    let layout = plan(&[empty("/dev/sda", 1000)], &[]);
    assert!(layout.records.is_empty());
    assert_eq!(layout.weight, 0);
}

#[test]
fn test_single_max_spans_gap() {
    let layout = plan(&[empty("/dev/sda", 1000)], &[DesiredPartition::new("/", SizePolicy::Max)]);
    assert_eq!(layout.records.len(), 1);
    assert_eq!(layout.records[0].start, 0);
    assert_eq!(layout.records[0].cylinders, 1000);
}

#[test]
fn test_fixed_sizes_are_honored() {
    let desired = vec![
        DesiredPartition::new("/boot", SizePolicy::Fixed(150 * MIB + 1)),
        DesiredPartition::new("swap", SizePolicy::Fixed(64 * MIB)),
        DesiredPartition::new("/", SizePolicy::Max),
    ];
    let layout = plan(&[empty("/dev/sda", 1000)], &desired);
    for (mount, bytes) in [("/boot", 150 * MIB + 1), ("swap", 64 * MIB)] {
        let record = layout.records.iter().find(|r| r.mount.as_deref() == Some(mount)).expect("placed");
        assert!(record.cylinders * MIB >= bytes);
    }
}

#[test]
fn test_three_halves() {
    let desired = vec![
        DesiredPartition::new("/a", SizePolicy::Percent(50)),
        DesiredPartition::new("/b", SizePolicy::Percent(50)),
        DesiredPartition::new("/c", SizePolicy::Percent(50)),
    ];
    let layout = plan(&[empty("/dev/sda", 1000)], &desired);
    assert_eq!(layout.records.len(), 3);
    for record in &layout.records {
        assert!((332..=334).contains(&record.cylinders));
    }
}

#[test]
fn test_reuse_pin_materializes_existing_number() {
    let disk = empty("/dev/sda", 1000)
        .with_partition(ExistingPartition::new(2, 600, 400, 0x83));
    let desired = vec![
        DesiredPartition::new("/", SizePolicy::Fixed(200 * MIB)),
        DesiredPartition::new("/home", SizePolicy::Max).with_reuse(2),
    ];
    let layout = plan(&[disk], &desired);
    let home = layout.records.iter().find(|r| r.mount.as_deref() == Some("/home")).expect("placed");
    assert_eq!(home.number, 2);
    assert!(!home.create);
}

#[test]
fn test_primary_budget_respected() {
    let desired: Vec<DesiredPartition> = (0..7)
        .map(|i| DesiredPartition::new(format!("/srv/{i}"), SizePolicy::Fixed(50 * MIB)))
        .collect();
    let layout = plan(&[empty("/dev/sda", 1000)], &desired);
    let primary_slots = layout
        .partitions()
        .filter(|r| r.kind != PartitionKind::Logical)
        .count();
    assert!(primary_slots <= 4);
    assert_eq!(layout.partitions().filter(|r| r.mount.is_some()).count(), 7);
}

#[test]
fn test_existing_extended_hosts_logicals() {
    let disk = empty("/dev/sda", 1000)
        .with_partition(ExistingPartition::new(1, 0, 200, 0x07))
        .with_partition(ExistingPartition::new(2, 200, 300, 0x0f).with_kind(PartitionKind::Extended))
        .with_partition(ExistingPartition::new(3, 500, 100, 0x07))
        .with_partition(ExistingPartition::new(4, 600, 400, 0x07));
    // every primary slot is taken; only the extended interior is usable
    let desired = vec![DesiredPartition::new("/", SizePolicy::Max)];
    let layout = plan_layout(&[disk], &desired, &PlanOptions::default(), &NoShrink).expect("feasible");
    let root = &layout.records[0];
    assert_eq!(root.kind, PartitionKind::Logical);
    assert_eq!(root.number, 5);
    assert_eq!((root.start, root.cylinders), (200, 300));
}

#[test]
fn test_logical_hint_gets_new_container() {
    let desired = vec![
        DesiredPartition::new("/", SizePolicy::Fixed(100 * MIB)),
        DesiredPartition::new("/home", SizePolicy::Max).with_kind(PartitionKind::Logical),
    ];
    let layout = plan(&[empty("/dev/sda", 1000)], &desired);

    let container = layout
        .records
        .iter()
        .find(|r| r.kind == PartitionKind::Extended)
        .expect("extended container planned");
    assert_eq!(container.fsid, 0x0f);
    assert!(container.create);

    let home = layout.records.iter().find(|r| r.mount.as_deref() == Some("/home")).expect("placed");
    assert_eq!(home.kind, PartitionKind::Logical);
    assert!(home.number > 4);
    assert!(home.start >= container.start && home.end() <= container.end());

    let root = layout.records.iter().find(|r| r.mount.as_deref() == Some("/")).expect("placed");
    assert_eq!(root.kind, PartitionKind::Primary);
}

#[test]
fn test_planning_is_deterministic() {
    let disks = vec![
        empty("/dev/sda", 4000).with_partition(ExistingPartition::new(1, 0, 300, 0x83)),
        empty("/dev/sdb", 4000),
    ];
    let desired = vec![
        DesiredPartition::new("/", SizePolicy::Percent(60)),
        DesiredPartition::new("/var", SizePolicy::Percent(30)),
        DesiredPartition::new("swap", SizePolicy::Auto),
    ];
    let first = plan(&disks, &desired);
    for _ in 0..3 {
        assert_eq!(plan(&disks, &desired), first);
    }
}

// =============================================================================
// Disk selection
// =============================================================================

#[test]
fn test_free_disk_beats_windows_resize() {
    let windows = empty("/dev/sda", 4000).with_partition(
        ExistingPartition::new(1, 0, 4000, 0x07)
            .with_shrink(ShrinkEstimate { used_bytes: GIB, proposed_bytes: GIB }),
    );
    let free = empty("/dev/sdb", 1000);
    let desired = vec![DesiredPartition::new("/", SizePolicy::Max)];

    let layout = plan(&[windows, free], &desired);
    assert_eq!(layout.device, "/dev/sdb");
    assert_eq!(layout.disk_index, 1);
    assert_eq!(layout.mode, PlanMode::Free);
}

#[test]
fn test_keep_list_survives_desperate_mode() {
    let disk = empty("/dev/sda", 1000)
        .with_partition(ExistingPartition::new(1, 0, 100, 0x0b))
        .with_partition(ExistingPartition::new(2, 100, 900, 0x07));
    let options = PlanOptions {
        prefer_remove: true,
        keep: KeepList { numbers: vec![1], ..KeepList::default() },
        ..PlanOptions::default()
    };
    let layout = plan_layout(&[disk], &[DesiredPartition::new("/", SizePolicy::Max)], &options, &NoShrink)
        .expect("feasible");
    assert_eq!(layout.mode, PlanMode::Desperate);
    let deleted: Vec<u32> = layout.records.iter().filter(|r| r.delete).map(|r| r.number).collect();
    assert_eq!(deleted, vec![2]);
}

#[test]
fn test_infeasible_everywhere() {
    let disks = vec![empty("/dev/sda", 10), empty("/dev/sdb", 20)];
    let err = plan_layout(
        &disks,
        &[DesiredPartition::new("/", SizePolicy::Fixed(GIB))],
        &PlanOptions::default(),
        &NoShrink,
    )
    .unwrap_err();
    assert!(err.is_infeasible());
    assert!(err.to_string().contains("2 disk(s)"));
}
