use std::io::Cursor;

use lacuna_core::patches::{read_patches, write_patches, Patch};
use lacuna_core::LacunaError;

fn sample_patches() -> Vec<Patch> {
    vec![
        Patch {
            src_left: 3,
            src_top: 7,
            dest_left: 40,
            dest_top: 40,
            priority: 0.25,
        },
        Patch {
            src_left: -2,
            src_top: 0,
            dest_left: 44,
            dest_top: 40,
            priority: 0.5,
        },
        Patch {
            src_left: 90,
            src_top: 12,
            dest_left: 48,
            dest_top: 44,
            priority: 1.0,
        },
    ]
}

#[test]
fn test_round_trip_is_bitwise() {
    let patches = sample_patches();

    let mut buffer = Vec::new();
    write_patches(&mut buffer, &patches).unwrap();
    let read = read_patches(&mut Cursor::new(&buffer)).unwrap();

    assert_eq!(read, patches);

    // And writing again reproduces the same bytes.
    let mut buffer2 = Vec::new();
    write_patches(&mut buffer2, &read).unwrap();
    assert_eq!(buffer, buffer2);
}

#[test]
fn test_empty_list_round_trips() {
    let mut buffer = Vec::new();
    write_patches(&mut buffer, &[]).unwrap();
    assert_eq!(buffer.len(), 4);
    assert_eq!(read_patches(&mut Cursor::new(&buffer)).unwrap(), vec![]);
}

#[test]
fn test_truncated_stream_is_rejected() {
    let patches = sample_patches();
    let mut buffer = Vec::new();
    write_patches(&mut buffer, &patches).unwrap();

    for cut in [0, 3, 4, 10, buffer.len() - 1] {
        let result = read_patches(&mut Cursor::new(&buffer[..cut]));
        assert!(
            matches!(result, Err(LacunaError::InvalidPatchesStream(_))),
            "cut at {cut} was not rejected"
        );
    }
}

#[test]
fn test_count_beyond_data_is_rejected() {
    let mut buffer = Vec::new();
    write_patches(&mut buffer, &sample_patches()).unwrap();
    // Claim one more record than the stream holds.
    buffer[0] = 4;
    assert!(read_patches(&mut Cursor::new(&buffer)).is_err());
}
