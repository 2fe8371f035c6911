use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use rhai::{Engine, EvalAltResult, Scope, AST};

use crate::cache::ResourceHandle;
use crate::images::{ImageCache, ImageResource};

/// Script-side view of the image cache. The raw pointer must stay valid for
/// as long as the engine it was registered on can run scripts; the engine
/// loop owns both and tears the host down first.
#[derive(Clone, Copy)]
pub struct ScriptApi {
    images: *mut ImageCache,
}

unsafe impl Send for ScriptApi {}
unsafe impl Sync for ScriptApi {}

impl ScriptApi {
    pub fn new(images: &mut ImageCache) -> Self {
        Self { images }
    }

    fn load_image(&mut self, path: &str) -> ScriptImage {
        let images = unsafe { &mut *self.images };
        match images.retrieve(path, false) {
            Ok(handle) => ScriptImage { handle: Some(handle) },
            Err(err) => {
                eprintln!("[script] load_image error for '{path}': {err}");
                ScriptImage::invalid()
            }
        }
    }

    fn image_path(&self, image: &ScriptImage) -> String {
        let images = unsafe { &*self.images };
        image
            .handle
            .as_ref()
            .and_then(|handle| images.path_of(handle))
            // Internally-held resources such as the defaults have no path.
            .unwrap_or("")
            .to_string()
    }

    fn bind_image(&mut self, image: &mut ScriptImage, path: &str) {
        let images = unsafe { &mut *self.images };
        match images.retrieve(path, false) {
            Ok(handle) => image.handle = Some(handle),
            Err(err) => {
                eprintln!("[script] image path '{path}' failed to load: {err}");
                image.handle = None;
            }
        }
    }

    fn log(&mut self, message: &str) {
        println!("[script] {message}");
    }
}

/// Image reference slot visible to scripts. Reading `path` yields the cached
/// path string; writing it performs a non-persistent retrieve and rebinds the
/// slot.
#[derive(Clone)]
pub struct ScriptImage {
    handle: Option<ResourceHandle<ImageResource>>,
}

impl ScriptImage {
    pub fn invalid() -> Self {
        Self { handle: None }
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&ResourceHandle<ImageResource>> {
        self.handle.as_ref()
    }

    fn width(&mut self) -> rhai::INT {
        self.handle.as_ref().map_or(0, |handle| handle.borrow().width() as rhai::INT)
    }

    fn height(&mut self) -> rhai::INT {
        self.handle.as_ref().map_or(0, |handle| handle.borrow().height() as rhai::INT)
    }
}

pub fn register_api(engine: &mut Engine, api: ScriptApi) {
    engine.register_type_with_name::<ScriptApi>("Images");
    engine.register_type_with_name::<ScriptImage>("Image");
    engine.register_fn("load_image", ScriptApi::load_image);
    engine.register_fn("log", ScriptApi::log);
    engine.register_get("valid", |image: &mut ScriptImage| image.is_valid());
    engine.register_get("width", ScriptImage::width);
    engine.register_get("height", ScriptImage::height);
    engine.register_get("path", move |image: &mut ScriptImage| api.image_path(image));
    engine.register_set("path", move |image: &mut ScriptImage, path: &str| {
        let mut api = api;
        api.bind_image(image, path);
    });
}

pub struct ScriptHost {
    engine: Engine,
    ast: Option<AST>,
    scope: Scope<'static>,
    script_path: PathBuf,
    last_modified: Option<SystemTime>,
    error: Option<String>,
    enabled: bool,
    initialized: bool,
}

impl ScriptHost {
    pub fn new(path: impl AsRef<Path>, api: ScriptApi) -> Self {
        let mut engine = Engine::new();
        engine.set_fast_operators(true);
        register_api(&mut engine, api);
        Self {
            engine,
            ast: None,
            scope: Scope::new(),
            script_path: path.as_ref().to_path_buf(),
            last_modified: None,
            error: None,
            enabled: true,
            initialized: false,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enable: bool) {
        self.enabled = enable;
    }

    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    pub fn force_reload(&mut self) -> Result<()> {
        self.load_script()
    }

    pub fn update(&mut self, images: &mut ImageCache, dt: f32) {
        if let Err(err) = self.reload_if_needed() {
            self.error = Some(err.to_string());
            return;
        }

        if !self.enabled {
            return;
        }
        let ast = match &self.ast {
            Some(ast) => ast,
            None => return,
        };

        let api = ScriptApi::new(images);
        if !self.initialized {
            match self.engine.call_fn::<()>(&mut self.scope, ast, "init", (api,)) {
                Ok(_) => {
                    self.initialized = true;
                    self.error = None;
                }
                Err(err) => {
                    if matches!(err.as_ref(), EvalAltResult::ErrorFunctionNotFound(..)) {
                        self.initialized = true;
                    } else {
                        self.error = Some(err.to_string());
                        return;
                    }
                }
            }
        }

        match self.engine.call_fn::<()>(&mut self.scope, ast, "update", (api, dt)) {
            Ok(_) => {
                self.error = None;
            }
            Err(err) => {
                if matches!(err.as_ref(), EvalAltResult::ErrorFunctionNotFound(..)) {
                    self.error = None;
                } else {
                    self.error = Some(err.to_string());
                }
            }
        }
    }

    fn reload_if_needed(&mut self) -> Result<()> {
        let metadata = match fs::metadata(&self.script_path) {
            Ok(meta) => meta,
            Err(err) => {
                return Err(anyhow!("Script file not accessible: {err}"));
            }
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if self.ast.is_none() || self.last_modified.map_or(true, |prev| modified > prev) {
            self.load_script()?;
        }
        Ok(())
    }

    fn load_script(&mut self) -> Result<()> {
        let source = fs::read_to_string(&self.script_path)
            .with_context(|| format!("Reading {}", self.script_path.display()))?;
        let ast = self.engine.compile(source).with_context(|| "Compiling Rhai script")?;
        self.scope = Scope::new();
        self.last_modified =
            fs::metadata(&self.script_path).ok().and_then(|meta| meta.modified().ok());
        self.initialized = false;
        self.error = None;
        self.ast = Some(ast);
        Ok(())
    }
}
