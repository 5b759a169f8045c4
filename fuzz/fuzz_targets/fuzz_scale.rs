#![no_main]

use std::io::Cursor;

use fitview::page::Viewport;
use fitview::scale::{MAX_SCALED_HEIGHT, scale_bytes};
use libfuzzer_sys::fuzz_target;

/// Headers claiming larger sources only measure the allocator.
const MAX_SOURCE_SIDE: u32 = 4096;

fuzz_target!(|data: &[u8]| {
    let _ = env_logger::builder().is_test(true).try_init();

    let Ok(reader) = image::ImageReader::new(Cursor::new(data)).with_guessed_format() else {
        return;
    };
    let Ok((w, h)) = reader.into_dimensions() else {
        return;
    };
    if w > MAX_SOURCE_SIDE || h > MAX_SOURCE_SIDE {
        return;
    }

    let viewport = Viewport::new(320, 240);
    // Decode failures are fine; panics are not.
    let Ok(page) = scale_bytes(data, viewport) else {
        return;
    };

    assert_eq!(page.width, viewport.width);
    assert!(page.height >= 1 && page.height <= MAX_SCALED_HEIGHT);
    assert!(page.file.is_none());
    let decoded = image::load_from_memory(&page.raster).expect("scaled output must decode");
    assert_eq!((decoded.width(), decoded.height()), (page.width, page.height));
});
