use super::*;
use crate::osc::read_frame;
use alda_common::parsing;
use alda_common::test_helpers::{compile, notes};
use tokio::net::TcpListener;

fn addresses(bundle: &OscBundle) -> Vec<&str> {
    bundle
        .messages()
        .into_iter()
        .map(|m| m.address.as_str())
        .collect()
}

/// `(address, int args)` for every message whose address ends with `suffix`
fn matching<'a>(bundle: &'a OscBundle, suffix: &str) -> Vec<(&'a str, Vec<i32>)> {
    bundle
        .messages()
        .into_iter()
        .filter(|m| m.address.ends_with(suffix))
        .map(|m| (m.address.as_str(), m.int_args()))
        .collect()
}

#[test]
fn test_basic_bundle() -> anyhow::Result<()> {
    let score = compile("piano: c d\npercussion: o2 c")?;
    let bundle = score_to_bundle(&score, &Default::default())?;
    assert_eq!(
        addresses(&bundle),
        [
            "/track/1/midi/patch",
            "/track/2/midi/patch",
            "/track/2/midi/percussion",
            "/track/1/midi/volume",
            "/track/1/midi/panning",
            "/track/1/midi/note",
            "/track/2/midi/volume",
            "/track/2/midi/panning",
            "/track/2/midi/note",
            "/track/1/midi/note",
            "/system/play",
        ]
    );
    assert_eq!(
        matching(&bundle, "/note"),
        [
            ("/track/1/midi/note", vec![0, 60, 500, 500, 127]),
            ("/track/2/midi/note", vec![0, 36, 500, 500, 127]),
            ("/track/1/midi/note", vec![500, 62, 500, 500, 127]),
        ]
    );
    // 100/127 scales back to 100; 0.5 rounds half to even.
    assert_eq!(matching(&bundle, "1/midi/volume")[0].1, [0, 100]);
    assert_eq!(matching(&bundle, "1/midi/panning")[0].1, [0, 64]);
    Ok(())
}

#[test]
fn test_patch_precedes_notes() -> anyhow::Result<()> {
    let score = compile("piano: c\nviolin: d\ncello: e")?;
    let bundle = score_to_bundle(&score, &Default::default())?;
    let addrs = addresses(&bundle);
    for (i, a) in addrs.iter().enumerate() {
        if let Some(track) = a.strip_suffix("/midi/note") {
            let patch = format!("{track}/midi/patch");
            let p = addrs.iter().position(|x| *x == patch).unwrap();
            assert!(p < i);
            assert_eq!(matching(&bundle, &patch)[0].1[0], 0);
        }
    }
    Ok(())
}

#[test]
fn test_volume_changes() -> anyhow::Result<()> {
    let score = compile("piano: (track-vol 50) c c (track-vol 60) c (track-vol 50) c c")?;
    let bundle = score_to_bundle(&score, &Default::default())?;
    let volumes: Vec<i32> = matching(&bundle, "/volume")
        .into_iter()
        .map(|(_, args)| args[1])
        .collect();
    // One message per run of equal values
    assert_eq!(volumes, [64, 76, 64]);
    assert_eq!(matching(&bundle, "/panning").len(), 1);
    Ok(())
}

#[test]
fn test_load_only_and_one_off() -> anyhow::Result<()> {
    let score = compile("piano: c d e")?;
    let bundle = score_to_bundle(
        &score,
        &TransmitOptions {
            load_only: true,
            one_off: true,
            ..Default::default()
        },
    )?;
    let addrs = addresses(&bundle);
    assert!(!addrs.contains(&"/system/play"));
    assert_eq!(
        matching(&bundle, "/system/shutdown"),
        [("/system/shutdown", vec![1000 + 1500])]
    );
    Ok(())
}

#[test]
fn test_sync_offsets() -> anyhow::Result<()> {
    let mut score = compile("piano: c d e f\n")?;
    let sync_offsets = score.part_offsets();
    let from_index = score.events.len();
    score.update(&parsing::parse("piano: g a b > c\n").map_err(alda_common::to_anyhow)?)?;
    let bundle = score_to_bundle(
        &score,
        &TransmitOptions {
            from_index: Some(from_index),
            sync_offsets,
            ..Default::default()
        },
    )?;
    let notes: Vec<(i32, i32)> = matching(&bundle, "/note")
        .into_iter()
        .map(|(_, args)| (args[0], args[1]))
        .collect();
    assert_eq!(notes, [(0, 67), (500, 69), (1000, 71), (1500, 72)]);
    Ok(())
}

#[test]
fn test_windows() -> anyhow::Result<()> {
    let score = compile("piano: c d %mid e f\nviolin: r2 g a")?;
    let offsets_of = |options: &TransmitOptions| -> anyhow::Result<Vec<(i32, i32)>> {
        Ok(matching(&score_to_bundle(&score, options)?, "/note")
            .into_iter()
            .map(|(_, args)| (args[0], args[1]))
            .collect())
    };
    assert_eq!(
        offsets_of(&TransmitOptions {
            from: Some("mid".to_string()),
            to: Some("0:01.5".to_string()),
            ..Default::default()
        })?,
        [(0, 64), (0, 67)]
    );
    // A sync offset past the event clamps to zero.
    let mut sync_offsets = BTreeMap::new();
    sync_offsets.insert(score.parts[1].id, 5000.0);
    assert_eq!(
        offsets_of(&TransmitOptions {
            from: Some("0:01".to_string()),
            sync_offsets,
            ..Default::default()
        })?,
        [(0, 64), (0, 67), (500, 65), (0, 69)]
    );
    let e = score_to_bundle(
        &score,
        &TransmitOptions {
            from: Some("nowhere".to_string()),
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(e.to_string().contains("neither a time marking"));
    Ok(())
}

#[test]
fn test_sorted_offsets() -> anyhow::Result<()> {
    let score = compile("piano: c8 d e f g\nviolin: c4 d e\npiano: %here c\ncello: @here c")?;
    let offsets: Vec<i32> = matching(&score_to_bundle(&score, &Default::default())?, "/note")
        .into_iter()
        .map(|(_, args)| args[0])
        .collect();
    assert!(offsets.is_sorted());
    assert_eq!(offsets.len(), notes(&score).len());
    Ok(())
}

#[tokio::test]
async fn test_transmit_round_trip() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let reader = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await?;
        read_frame(&mut stream).await
    });
    let score = compile("piano: (vol 80) c d\nflute: o5 e f")?;
    let options = TransmitOptions {
        load_only: true,
        ..Default::default()
    };
    OscTransmitter::new(port).transmit_score(&score, &options).await?;
    let Some(OscPacket::Bundle(received)) = reader.await?? else {
        panic!("expected a bundle");
    };
    let tuples: Vec<(String, i32, i32, i32)> = received
        .messages()
        .into_iter()
        .filter_map(|m| {
            let track = m.address.strip_suffix("/midi/note")?.to_string();
            let a = m.int_args();
            Some((track, a[0], a[1], a[4]))
        })
        .collect();
    let mut expected: Vec<(String, i32, i32, i32)> = notes(&score)
        .iter()
        .map(|n| {
            (
                format!("/track/{}", score.track(n.part).unwrap()),
                n.offset as i32,
                n.midi_note as i32,
                (n.velocity * 127.0).round_ties_even() as i32,
            )
        })
        .collect();
    expected.sort_by_key(|t| t.1);
    assert_eq!(tuples, expected);
    assert!(!addresses(&received).contains(&"/system/play"));
    Ok(())
}

#[tokio::test]
async fn test_single_messages() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let reader = tokio::spawn(async move {
        let mut received = Vec::new();
        for _ in 0..4 {
            let (mut stream, _) = listener.accept().await?;
            if let Some(OscPacket::Message(m)) = read_frame(&mut stream).await? {
                received.push(m);
            }
        }
        anyhow::Ok(received)
    });
    let t = OscTransmitter::new(port);
    t.ping().await?;
    t.stop().await?;
    t.shutdown(0).await?;
    t.export(Path::new("/tmp/out.mid")).await?;
    let received = reader.await??;
    assert_eq!(
        received,
        [
            OscMessage::new("/ping", vec![]),
            OscMessage::new("/system/stop", vec![]),
            OscMessage::new("/system/shutdown", vec![0.into()]),
            OscMessage::new("/system/midi/export", vec!["/tmp/out.mid".into()]),
        ]
    );
    Ok(())
}
