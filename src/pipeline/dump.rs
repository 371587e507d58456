//! Human-readable listing of every track's events

use std::io::Write;

use crate::error::Result;
use crate::pipeline::parser::EventKind;
use crate::pipeline::smf::File;

/// Write the header and each track's events to `out`
///
/// Listing of a track stops at its end marker or at the first event whose
/// status is not recognised; the offending status byte is printed.
pub fn dump_tracks(file: &File<'_>, out: &mut impl Write) -> Result<()> {
    writeln!(
        out,
        "format: {}, tracks: {}, division: {}",
        file.format(),
        file.track_count(),
        file.division()
    )?;

    for (index, track) in file.tracks().enumerate() {
        let track = track?;
        writeln!(out, "track {}: {} bytes", index, track.length())?;

        for event in track.events() {
            let kind = event.kind();
            write!(
                out,
                "  {:<18} +{:<6}",
                kind.name(),
                event.delta_time().value
            )?;

            if let Some(channel) = event.channel() {
                write!(out, " ch {:x}: {:04x}", channel, event.midi_data())?;
            }

            match kind {
                EventKind::Text => {
                    if let Some(text) = event.text() {
                        write!(out, " {:?}", text)?;
                    }
                }
                EventKind::Tempo => {
                    if let Some(tempo) = event.tempo() {
                        write!(out, " {} us/quarter", tempo)?;
                    }
                }
                EventKind::Unknown => {
                    write!(
                        out,
                        " status {:#04x} at byte {}",
                        event.status(),
                        event.offset()
                    )?;
                }
                _ => {}
            }

            writeln!(out)?;
        }
    }

    Ok(())
}
