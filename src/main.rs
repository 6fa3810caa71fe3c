use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use stratum::buffer::BufferPoolManager;
use stratum::index::{BPlusTree, IntegerComparator};
use stratum::storage::disk::DiskManager;
use stratum::{PageId, RecordId, SlotId};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Stratum - a disk-oriented storage engine core");
    println!("=============================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to create disk manager"));
    println!("Created disk manager for: {}", db_path);

    // 64 frames, LRU-2 replacement
    let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
    println!("Created buffer pool manager with 64 frames\n");

    let header_page_id = bpm.new_page();
    let tree = BPlusTree::new(Arc::clone(&bpm), header_page_id, IntegerComparator, 32, 32);
    println!("Created B+ tree with header at {}", header_page_id);

    for i in 1..=100u64 {
        let key = i.to_le_bytes();
        let value = RecordId::new(PageId::new(i as u32), SlotId::new(0));
        tree.insert(&key, value);
    }
    println!("Inserted keys 1..=100");

    let probe = 42u64.to_le_bytes();
    match tree.get_value(&probe) {
        Some(value) => println!("Lookup 42 -> {}", value),
        None => println!("Lookup 42 -> not found"),
    }

    for i in 1..=50u64 {
        tree.remove(&i.to_le_bytes());
    }
    println!("Removed keys 1..=50");

    let remaining: Vec<u64> = tree.begin().map(|(key, _)| u64::from_le_bytes(key)).collect();
    println!(
        "Scan: {} keys remain, first {:?}, last {:?}",
        remaining.len(),
        remaining.first(),
        remaining.last()
    );

    bpm.flush_all_pages().expect("flush failed");
    println!("Flushed all pages to disk");

    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
