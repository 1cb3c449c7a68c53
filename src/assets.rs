use include_dir::{include_dir, Dir};

static ASSETS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/assets");

pub const DISPLAY_FONT: &str = "fonts/DejaVuSansCondensed-Bold.ttf";
pub const BODY_FONT: &str = "fonts/DejaVuSansCondensed.ttf";
pub const ITALIC_FONT: &str = "fonts/DejaVuSans-Oblique.ttf";
pub const DEFAULT_TEMPLATES: &str = "templates.json";

/// Bytes of a file embedded from `assets/` at build time.
pub fn get(path: &str) -> Option<&'static [u8]> {
    ASSETS.get_file(path).map(|f| f.contents())
}
