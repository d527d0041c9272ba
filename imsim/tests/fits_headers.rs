mod common;

use imsim::composite::ImageKey;
use imsim::FitsImageWriter;
use shared::frame_writer::FitsFrame;
use shared::test_util::TestOutput;

use common::{compositor, init_logging, pair_camera, point_source};

#[test]
fn test_legacy_provenance_round_trip() {
    init_logging();
    let output = TestOutput::new("legacy_provenance").unwrap();
    let root = output.root("visit");
    let mut comp = compositor(pair_camera(true), &["u"], 5);
    comp.draw_object(&point_source(1, -8.0, 2.0, 40_000.0)).unwrap();

    let written = comp
        .write_images(root.to_str(), &FitsImageWriter)
        .unwrap();
    assert_eq!(written.len(), 1);
    let path = &written[0];
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("visit_R_2_2_S_1_1_u.fits")
    );

    let mut frame = FitsFrame::open(path).unwrap();
    assert_eq!(frame.read_str("CHIPID").unwrap(), "R22_S11");
    assert_eq!(frame.read_int("OBSID").unwrap(), 4242);
    assert_eq!(frame.read_str("OUTFILE").unwrap(), "lsst_e_4242_f0_R22_S11_E000");
    assert_eq!(frame.read_str("CTYPE1").unwrap(), "RA---TAN-SIP");
    assert_eq!(frame.read_str("FILTER").unwrap(), "u");

    let image = comp
        .images()
        .get(&ImageKey::new(&comp.detectors()[0], "u"))
        .unwrap();
    assert_eq!(frame.pixels.dim(), (200, 200));
    let stored: f64 = frame.pixels.iter().map(|&v| v as f64).sum();
    assert!((stored - image.sum()).abs() < 1e-3 * image.sum());

    let crval1 = frame.read_float("CRVAL1").unwrap();
    assert!((crval1 - image.wcs().crval()[0]).abs() < 1e-9);
}

#[test]
fn test_no_provenance_for_plain_camera() {
    let output = TestOutput::new("plain_provenance").unwrap();
    let root = output.root("plain");
    let mut comp = compositor(pair_camera(false), &["u", "g"], 6);
    comp.draw_object(&point_source(2, 0.1, 0.0, 5_000.0)).unwrap();

    let written = comp.write_images(root.to_str(), &FitsImageWriter).unwrap();
    assert_eq!(written.len(), 4);
    for path in &written {
        let mut frame = FitsFrame::open(path).unwrap();
        assert!(!frame.has_key("CHIPID"));
        assert!(!frame.has_key("OUTFILE"));
        assert!(frame.has_key("CTYPE2"));
    }
}
