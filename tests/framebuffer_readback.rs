use std::rc::Rc;

use gl_filter_chain::{Framebuffer, RecordingGl};

#[test]
fn save_png_writes_the_color_attachment() {
    let gl = Rc::new(RecordingGl::new());
    let mut framebuffer = Framebuffer::new(gl.clone(), 5, 3);
    framebuffer
        .init()
        .unwrap_or_else(|e| panic!("framebuffer init failed: {e}"));

    let path = std::env::temp_dir().join(format!(
        "gl-filter-chain-readback-{}.png",
        std::process::id()
    ));
    framebuffer
        .save_png(&path)
        .unwrap_or_else(|e| panic!("save_png failed: {e:#}"));

    let saved = image::open(&path)
        .unwrap_or_else(|e| panic!("failed to reopen {}: {e}", path.display()))
        .into_rgba8();
    let _ = std::fs::remove_file(&path);
    assert_eq!(saved.dimensions(), (5, 3));
    assert!(saved.pixels().all(|p| p.0 == [0, 0, 0, 0]));
}

#[test]
fn readback_of_uninitialized_framebuffer_fails() {
    let gl = Rc::new(RecordingGl::new());
    let framebuffer = Framebuffer::new(gl, 5, 3);
    assert!(framebuffer.read_pixels().is_err());
    assert!(framebuffer.save_png("unused.png").is_err());
}
