use clap::Parser;
use probe_map::OpenHashMap;
use probe_map::TableConfig;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    #[arg(short = 'l', long = "load_factor", default_value_t = 0.6)]
    load_factor: f64,

    /// Percentage of entries to remove after filling, to show how
    /// backward-shift deletion and compaction affect probe lengths.
    #[arg(short = 'r', long = "remove_percent", default_value_t = 50)]
    remove_percent: u64,
}

fn main() {
    let args = Args::parse();

    let config = TableConfig::default()
        .with_initial_capacity(args.target_capacity)
        .with_load_factor(args.load_factor);
    let mut map: OpenHashMap<u64, u64> = match OpenHashMap::try_with_config(config) {
        Ok(map) => map,
        Err(error) => {
            eprintln!("invalid configuration: {error}");
            std::process::exit(2);
        }
    };

    println!(
        "Created OpenHashMap with {} slots, resize threshold {}",
        map.capacity(),
        map.resize_threshold()
    );

    let num_values = map.resize_threshold() as u64;
    println!("Filling map with {num_values} u64 keys (no resize)...");
    for key in 0..num_values {
        map.insert(key, key);
    }

    println!("Inserted {} values", map.len());
    map.probe_stats().print();

    let remove_every = 100 / args.remove_percent.clamp(1, 100);
    map.retain(|&key, _| key % remove_every != 0);
    println!();
    println!(
        "Removed keys divisible by {remove_every}; {} values remain",
        map.len()
    );
    map.probe_stats().print();

    map.compact();
    println!();
    println!("After compact():");
    map.probe_stats().print();
}
