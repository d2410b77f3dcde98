use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{ContentArrangement, Table, presets::NOTHING};

use sidfrag::sidfile::{SidHeader, SongSpeed};

/// Pretty-print the PSID/RSID header of a .sid file.
pub fn run(path: &Path) -> Result<()> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let header = SidHeader::parse(&bytes)
        .with_context(|| format!("failed to parse SID header in {}", path.display()))?;

    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let magic = if header.is_rsid { "RSID" } else { "PSID" };
    table.add_row(vec!["format", &format!("{} v{}", magic, header.version)]);
    table.add_row(vec!["name", &header.name]);
    table.add_row(vec!["author", &header.author]);
    table.add_row(vec!["released", &header.released]);
    table.add_row(vec![
        "songs",
        &format!("{} (start {})", header.songs, header.start_song),
    ]);
    table.add_row(vec![
        "load/init/play",
        &format!(
            "${:04X} / ${:04X} / ${:04X}",
            header.load_address, header.init_address, header.play_address
        ),
    ]);
    table.add_row(vec!["video", &format!("{:?}", header.video)]);
    table.add_row(vec![
        "sid model",
        &format!(
            "{:?} / {:?} / {:?}",
            header.sid_model[0], header.sid_model[1], header.sid_model[2]
        ),
    ]);
    table.add_row(vec!["chips", &header.num_sids().to_string()]);
    if header.second_sid_address != 0 {
        table.add_row(vec![
            "2nd sid",
            &format!("${:04X}", header.second_sid_address),
        ]);
    }
    if header.third_sid_address != 0 {
        table.add_row(vec![
            "3rd sid",
            &format!("${:04X}", header.third_sid_address),
        ]);
    }

    // Per-song timer source from the speed bitmask.
    let speeds: Vec<String> = (1..=header.songs.min(32))
        .map(|song| match header.song_speed(song) {
            SongSpeed::Vbi => format!("{}:vbi", song),
            SongSpeed::Cia => format!("{}:cia", song),
        })
        .collect();
    table.add_row(vec!["speed", &speeds.join(" ")]);

    println!("{table}");
    Ok(())
}
