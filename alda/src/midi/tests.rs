use super::*;
use alda_common::test_helpers::compile;
use std::fs;

/// Absolute tick, channel, and message for every MIDI event in a track
fn events(track: &[TrackEvent]) -> Vec<(u32, u8, MidiMessage)> {
    let mut time = 0;
    track
        .iter()
        .filter_map(|e| {
            time += e.delta.as_int();
            match e.kind {
                TrackEventKind::Midi { channel, message } => {
                    Some((time, channel.as_int(), message))
                }
                _ => None,
            }
        })
        .collect()
}

fn note_ons(track: &[TrackEvent]) -> Vec<(u32, u8)> {
    events(track)
        .into_iter()
        .filter_map(|(t, _, m)| match m {
            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => Some((t, key.as_int())),
            _ => None,
        })
        .collect()
}

#[test]
fn test_export_file() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("out.mid");
    save(&compile("piano: c d e")?, &path)?;
    let data = fs::read(&path)?;
    let smf = Smf::parse(&data)?;
    assert_eq!(smf.header.format, Format::Parallel);
    assert_eq!(smf.header.timing, Timing::Metrical(TICKS_PER_BEAT.into()));
    assert_eq!(smf.tracks.len(), 2);
    assert_eq!(note_ons(&smf.tracks[1]), [(0, 60), (500, 62), (1000, 64)]);
    // Every track ends at the same time.
    for track in &smf.tracks {
        let total: u32 = track.iter().map(|e| e.delta.as_int()).sum();
        assert_eq!(total, 1500);
        assert!(matches!(
            track.last().map(|e| e.kind),
            Some(TrackEventKind::Meta(EndOfTrack))
        ));
    }
    Ok(())
}

#[test]
fn test_channels_and_controllers() -> anyhow::Result<()> {
    let score = compile("percussion: o2 c\nflute: (pan 0) c (pan 100) c c")?;
    let mut data = Vec::new();
    write(&score, &mut data)?;
    let smf = Smf::parse(&data)?;
    let drums = events(&smf.tracks[1]);
    assert!(drums.iter().all(|(_, channel, _)| *channel == PERCUSSION_CHANNEL));
    assert!(
        !drums
            .iter()
            .any(|(_, _, m)| matches!(m, MidiMessage::ProgramChange { .. }))
    );

    let flute = events(&smf.tracks[2]);
    assert!(flute.iter().all(|(_, channel, _)| *channel == 0));
    assert_eq!(
        flute[0].2,
        MidiMessage::ProgramChange {
            program: 73.into()
        }
    );
    let pans: Vec<(u32, u8)> = flute
        .iter()
        .filter_map(|(t, _, m)| match m {
            MidiMessage::Controller { controller, value }
                if controller.as_int() == CONTROLLER_PAN =>
            {
                Some((*t, value.as_int()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(pans, [(0, 0), (500, 127)]);
    Ok(())
}

#[test]
fn test_repeated_notes() -> anyhow::Result<()> {
    // Each note's end is written before the next start at the same tick.
    let score = compile("piano: c c")?;
    let mut data = Vec::new();
    write(&score, &mut data)?;
    let smf = Smf::parse(&data)?;
    let at_500: Vec<MidiMessage> = events(&smf.tracks[1])
        .into_iter()
        .filter(|(t, _, _)| *t == 500)
        .map(|(_, _, m)| m)
        .collect();
    assert!(matches!(at_500[0], MidiMessage::NoteOff { .. }));
    assert!(matches!(at_500[1], MidiMessage::NoteOn { .. }));
    Ok(())
}
