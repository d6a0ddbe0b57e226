#![allow(missing_docs)]
//! Host-level tests for the occupancy bitmap.

use matrix_envoy::sim::bitmap::Bitmap;

#[test]
fn set_get_clear_roundtrip() {
    let mut bitmap: Bitmap<8, 8> = Bitmap::new();
    assert!(!bitmap.get(3, 5));

    bitmap.set(3, 5);
    assert!(bitmap.get(3, 5));

    bitmap.clear(3, 5);
    assert!(!bitmap.get(3, 5));
}

#[test]
fn neighboring_bits_are_independent() {
    let mut bitmap: Bitmap<8, 8> = Bitmap::new();
    bitmap.set(4, 4);

    assert!(!bitmap.get(3, 4));
    assert!(!bitmap.get(5, 4));
    assert!(!bitmap.get(4, 3));
    assert!(!bitmap.get(4, 5));

    bitmap.clear(3, 4);
    assert!(bitmap.get(4, 4), "clearing a neighbor must not clear the bit");
}

#[test]
fn full_width_row_uses_all_32_columns() {
    let mut bitmap: Bitmap<32, 2> = Bitmap::new();
    for x in 0..32 {
        bitmap.set(x, 0);
    }
    for x in 0..32 {
        assert!(bitmap.get(x, 0));
        assert!(!bitmap.get(x, 1), "row 1 must stay clear");
    }
    assert_eq!(bitmap.count(), 32);
}

#[test]
fn clear_all_empties_every_cell() {
    let mut bitmap: Bitmap<16, 16> = Bitmap::new();
    for index in 0..16 {
        bitmap.set(index, index);
    }
    assert_eq!(bitmap.count(), 16);

    bitmap.clear_all();
    assert_eq!(bitmap.count(), 0);
    for index in 0..16 {
        assert!(!bitmap.get(index, index));
    }
}

#[test]
fn count_tracks_sets_and_clears() {
    let mut bitmap: Bitmap<4, 4> = Bitmap::new();
    bitmap.set(0, 0);
    bitmap.set(3, 3);
    bitmap.set(3, 3); // setting twice is idempotent
    assert_eq!(bitmap.count(), 2);

    bitmap.clear(0, 0);
    assert_eq!(bitmap.count(), 1);
}
