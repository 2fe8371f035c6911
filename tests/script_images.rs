use std::fs;
use std::path::Path;

use shrike_engine::gfx::{GraphicsContext, TextureLimits};
use shrike_engine::images::ImageCache;
use shrike_engine::scripts::{ScriptApi, ScriptHost};

fn headless_cache() -> ImageCache {
    let mut images = ImageCache::new();
    images
        .set_context(GraphicsContext::headless(TextureLimits::new(16, 256)))
        .expect("set headless context");
    images
}

fn write_rgba_png(dir: &Path, name: &str, width: u32, height: u32) -> String {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([0x20, 0x40, 0x80, 0xff]));
    let path = dir.join(name);
    img.save_with_format(&path, image::ImageFormat::Png).expect("write png");
    path.to_string_lossy().into_owned()
}

#[test]
fn scripts_load_images_by_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sprite = write_rgba_png(dir.path(), "sprite.png", 64, 32);
    let script_path = dir.path().join("images.rhai");
    fs::write(
        &script_path,
        format!(
            r#"
fn init(api) {{
    let img = api.load_image("{sprite}");
    if !img.valid {{ throw "image did not load"; }}
    if img.width != 64 {{ throw "wrong width"; }}
    if img.height != 32 {{ throw "wrong height"; }}
    if img.path != "{sprite}" {{ throw "wrong path"; }}
    api.log("sprite bound");
}}
"#
        ),
    )
    .expect("write script");

    let mut images = headless_cache();
    let api = ScriptApi::new(&mut images);
    let mut host = ScriptHost::new(&script_path, api);
    host.update(&mut images, 0.016);
    assert_eq!(host.last_error(), None);
}

#[test]
fn writing_the_path_field_rebinds_the_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = write_rgba_png(dir.path(), "first.png", 32, 32);
    let second = write_rgba_png(dir.path(), "second.png", 128, 64);
    let script_path = dir.path().join("rebind.rhai");
    fs::write(
        &script_path,
        format!(
            r#"
fn init(api) {{
    let img = api.load_image("{first}");
    img.path = "{second}";
    if img.width != 128 {{ throw "rebind did not load the new image"; }}
    if img.path != "{second}" {{ throw "rebind kept the old path"; }}
}}
"#
        ),
    )
    .expect("write script");

    let mut images = headless_cache();
    let api = ScriptApi::new(&mut images);
    let mut host = ScriptHost::new(&script_path, api);
    host.update(&mut images, 0.016);
    assert_eq!(host.last_error(), None);
}

#[test]
fn failed_script_loads_yield_invalid_handles() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script_path = dir.path().join("missing.rhai");
    fs::write(
        &script_path,
        r#"
fn init(api) {
    let img = api.load_image("no/such/image.png");
    if img.valid { throw "missing image must be invalid"; }
    if img.width != 0 { throw "invalid image must report zero width"; }
    if img.path != "" { throw "invalid image must have no path"; }
}
"#,
    )
    .expect("write script");

    let mut images = headless_cache();
    let api = ScriptApi::new(&mut images);
    let mut host = ScriptHost::new(&script_path, api);
    host.update(&mut images, 0.016);
    assert_eq!(host.last_error(), None);
}
