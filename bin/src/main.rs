use std::env;
use std::path::PathBuf;
use std::process;

use dotenv::dotenv;
use http::Extensions;
use tracing::{error, info, warn};

use magsel::hash::crc32c;
use magsel::select::service::MaglevService;

mod vector;

use vector::{FlowEntry, TestVector};

/// rebuild the flow key hash the way the packet path derives it:
/// crc over the protocol byte, then over the 36-byte flow record with
/// the xor-folded addresses and ports
fn flow_key_hash(entry: &FlowEntry) -> u32 {
    let mut record = [0u8; 36];
    record[16..20].copy_from_slice(&(entry.sip ^ entry.dip).to_le_bytes());
    record[32..34].copy_from_slice(&(entry.sport ^ entry.dport).to_le_bytes());
    let basis = crc32c::hash_bytes(&[entry.protocol], 0);
    crc32c::hash_bytes(&record, basis)
}

/// build the service from the vector header and verify every flow
fn verify(vector: &TestVector) -> u32 {
    info!(
        "start verifying maglev: group={}, table_idx={}, num_buckets={}, bucket_weight={}, num_flows={}",
        vector.group,
        vector.table_index,
        vector.buckets,
        vector.bucket_weight,
        vector.flows.len()
    );

    let service = MaglevService::new(vector.group, vector.table_index);
    for bucket in 1..=vector.buckets {
        service.add_or_update(bucket, vector.bucket_weight, Extensions::new());
    }
    if let Err(e) = service.build() {
        error!("failed to build lookup table: {e}");
        process::exit(1);
    }

    let mut mismatched = 0;
    for (at, entry) in vector.flows.iter().enumerate() {
        let hash = flow_key_hash(entry);
        if let Some(expected) = entry.hash {
            if expected != hash {
                warn!("{at}: mismatched hash: 0x{hash:x}, expected=0x{expected:x}");
                mismatched += 1;
                continue;
            }
        }
        let selected = service.lookup(hash).map(|dest| dest.id());
        match (selected, entry.bucket) {
            (Some(got), Some(expected)) if got != expected => {
                warn!("{at}: mismatched bucket: {got}, expected={expected}, hash=0x{hash:x}");
                mismatched += 1;
            }
            (None, _) => {
                warn!("{at}: no bucket selected, hash=0x{hash:x}");
                mismatched += 1;
            }
            (Some(got), _) => {
                info!("{at}: bucket={got}, hash=0x{hash:x}");
            }
        }
    }

    info!(
        "verification result: total={}, mismatched={mismatched}",
        vector.flows.len()
    );
    mismatched
}

fn print_usage(name: &str) {
    println!("usage: {name} [-h] [-f file]");
    println!("options:");
    println!("  -h       : print this help");
    println!("  -f [file]: test vector file name");
}

fn main() {
    // load env
    dotenv().ok();
    // setup tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    let mut args = env::args();
    let name = args.next().unwrap_or_else(|| "magsel-sim".to_string());
    let mut vector_file: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" => {
                print_usage(&name);
                return;
            }
            "-f" => vector_file = args.next().map(PathBuf::from),
            _ => {
                print_usage(&name);
                process::exit(1);
            }
        }
    }
    let vector_file = match vector_file {
        Some(path) => path,
        None => {
            warn!("test vector file name required");
            process::exit(1);
        }
    };

    info!("start maglev simulator");
    let vector = match vector::load(&vector_file) {
        Ok(vector) => vector,
        Err(e) => {
            error!("failed to load test vector: {e}");
            process::exit(1);
        }
    };

    let mismatched = verify(&vector);
    info!("end maglev simulator");
    if mismatched > 0 {
        process::exit(1);
    }
}
