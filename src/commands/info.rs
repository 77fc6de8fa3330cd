//! Info command

use dapprog_dummy::AlgorithmDescription;
use dapprog_programmer::ProgrammerConfig;

/// Print the flash and RAM layout of an algorithm description
pub fn run_info(
    config: &ProgrammerConfig,
    algorithm: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.algorithm_root.join(algorithm);
    let desc = AlgorithmDescription::from_file(&path)?;

    let flash = desc.flash_range();
    let ram = desc.ram_range();

    println!("Algorithm: {}", desc.name);
    println!(
        "Flash:     0x{:08X} - 0x{:08X} ({} KiB)",
        flash.start,
        flash.end - 1,
        desc.flash_size / 1024
    );
    println!("Page size: {} bytes", desc.page_size);
    println!("Sectors:");
    for (i, region) in desc.sectors.iter().enumerate() {
        let end = desc.sectors.get(i + 1).map_or(flash.end, |next| next.start);
        println!(
            "  0x{:08X} - 0x{:08X}: {} x {} bytes",
            region.start,
            end - 1,
            (end - region.start) / region.size,
            region.size
        );
    }
    println!(
        "RAM:       0x{:08X} - 0x{:08X} (algorithm needs {} bytes)",
        ram.start,
        ram.end.saturating_sub(1),
        desc.blob_size
    );
    println!("Clock:     {} Hz", desc.clock_hz);
    println!("Entry points: {:?}", desc.capabilities());
    if let Some(addr) = desc.fail_at {
        println!("Simulated fault at 0x{:08X}", addr);
    }

    Ok(())
}
