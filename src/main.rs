use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{fs, path::PathBuf};

use midly::{Smf, Timing};

mod message;
mod output;
mod timeline;
mod track;

use message::{Message, decode_track, track_name};
use timeline::{Defaults, build_timeline};
use track::extract_track;

/// Convert a Standard MIDI File into per-track JSON event data.
///
/// Track 0 is treated as the header track: its tempo and time-signature
/// changes go to header_<name>.json. Every other track becomes <name>.json
/// with absolute-time notes, controller curves and pitch bends.
#[derive(Parser, Debug)]
struct Opt {
    /// Path to the MIDI file to convert
    midi: PathBuf,
    /// Directory the JSON files are written into
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    let bytes = fs::read(&opt.midi).with_context(|| format!("reading {:?}", opt.midi))?;
    let smf = Smf::parse(&bytes).context("parsing MIDI file")?;

    let tpq = match smf.header.timing {
        Timing::Metrical(t) => t.as_int(),
        Timing::Timecode(..) => bail!("SMPTE timing is not supported"),
    };

    let tracks: Vec<Vec<Message>> = smf.tracks.iter().map(|t| decode_track(t)).collect();
    let Some((header, rest)) = tracks.split_first() else {
        bail!("MIDI file has no tracks");
    };

    fs::create_dir_all(&opt.out_dir)
        .with_context(|| format!("creating output directory {:?}", opt.out_dir))?;

    let defaults = Defaults::default();
    let timeline = build_timeline(header, tpq, defaults)?;
    println!("PPQ: {}", tpq);
    println!(
        "Tempo changes: {}, time-signature changes: {}",
        timeline.tempos.len(),
        timeline.signatures.len()
    );

    let header_path = opt
        .out_dir
        .join(format!("header_{}.json", track_name(header).unwrap_or_default()));
    output::write_json(&header_path, &timeline)?;
    println!("Wrote {}", header_path.display());

    for (i, msgs) in rest.iter().enumerate() {
        let name = track_name(msgs)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("track_{}", i + 1));

        // One bad track doesn't block the rest of the file
        match extract_track(msgs, tpq, &timeline, defaults) {
            Ok(out) => {
                let path = opt.out_dir.join(format!("{name}.json"));
                output::write_json(&path, &out)?;
                println!(
                    "Wrote {} ({} notes, {} controllers, {} bends)",
                    path.display(),
                    out.notes.len(),
                    out.control_changes.len(),
                    out.pitch_bends.len()
                );
            }
            Err(e) => eprintln!("Skipping track {}: {:#}", i + 1, e),
        }
    }

    Ok(())
}
