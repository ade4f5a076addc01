//! Module loader: application code by local or SUN path.
//!
//! Local paths resolve relative to the configured code root and load from
//! the filesystem; SUN paths (absolute, `/`-rooted) resolve through the
//! site's routing tree and fetch the module text via the `LOCAL::text`
//! endpoint of the object at that path. Loaded modules are cached by
//! normalized path; while a module links, it sits in the cache in a
//! `linking` state, and re-encountering a linking path on the current
//! dependency stack raises the circular-import error with the full chain.
//! A failed load leaves no partial cache entry behind.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;

use crate::error::{CoreError, Result};
use crate::system::System;

/// A loaded module: its normalized path, source text, and the imports the
/// source declares.
#[derive(Debug)]
pub struct Module {
    pub path: String,
    pub source: String,
    pub imports: Vec<String>,
}

enum Slot {
    Linking,
    Ready(Arc<Module>),
}

pub struct ModuleLoader {
    code_root: PathBuf,
    modules: DashMap<String, Slot>,
    /// Loads are serialized: one dependency walk at a time, so the linking
    /// states in the cache always belong to the current stack.
    gate: tokio::sync::Mutex<()>,
}

impl ModuleLoader {
    pub fn new(code_root: impl Into<PathBuf>) -> ModuleLoader {
        ModuleLoader {
            code_root: code_root.into(),
            modules: DashMap::new(),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Load a module and its imports. Re-importing a path returns the same
    /// module instance.
    pub async fn load(
        &self,
        system: &Arc<System>,
        path: &str,
        referrer: Option<&str>,
    ) -> Result<Arc<Module>> {
        let _walk = self.gate.lock().await;
        let mut stack: Vec<String> = Vec::new();
        self.load_inner(system, path, referrer, &mut stack).await
    }

    fn load_inner<'a>(
        &'a self,
        system: &'a Arc<System>,
        path: &'a str,
        referrer: Option<&'a str>,
        stack: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<Arc<Module>>> {
        async move {
            let normalized = normalize(path, referrer)?;

            let cached = self.modules.get(&normalized).map(|entry| match &*entry {
                Slot::Ready(module) => Some(module.clone()),
                Slot::Linking => None,
            });
            match cached {
                Some(Some(module)) => return Ok(module),
                Some(None) => {
                    // Linking entries always sit on the current stack (the
                    // walk gate serializes loads), so this is a cycle.
                    let first = stack
                        .iter()
                        .position(|p| p == &normalized)
                        .unwrap_or_default();
                    let mut chain: Vec<String> = stack[first..].to_vec();
                    chain.push(normalized.clone());
                    return Err(CoreError::CircularImport { chain });
                }
                None => {}
            }

            self.modules.insert(normalized.clone(), Slot::Linking);
            stack.push(normalized.clone());

            let outcome = async {
                let source = self.fetch(system, &normalized).await?;
                let imports = scan_imports(&source);
                for import in &imports {
                    self.load_inner(system, import, Some(&normalized), stack)
                        .await?;
                }
                Ok(Arc::new(Module {
                    path: normalized.clone(),
                    source,
                    imports,
                }))
            }
            .await;

            stack.pop();
            match outcome {
                Ok(module) => {
                    self.modules
                        .insert(normalized.clone(), Slot::Ready(module.clone()));
                    tracing::debug!(path = %normalized, "module loaded");
                    Ok(module)
                }
                Err(e) => {
                    // Never leave a partial module behind: the next load of
                    // this path starts from scratch (and fails the same way
                    // if the cycle persists).
                    self.modules.remove(&normalized);
                    Err(e)
                }
            }
        }
        .boxed()
    }

    async fn fetch(&self, system: &Arc<System>, normalized: &str) -> Result<String> {
        if normalized.starts_with('/') {
            // SUN path: the module text is served by the object at that
            // path through its LOCAL::text endpoint.
            return crate::dispatch::local_call(system, normalized, "text").await;
        }
        let full = self.code_root.join(normalized);
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|_| CoreError::ModuleNotFound {
                path: normalized.to_string(),
            })
    }
}

/// Normalize a module path: resolve `.`/`..`, apply the referrer for
/// relative imports, reject escapes above the root. SUN paths keep their
/// leading slash; local paths are stored root-relative.
pub fn normalize(path: &str, referrer: Option<&str>) -> Result<String> {
    let relative = path.starts_with("./") || path.starts_with("../");
    let combined = if relative {
        let referrer = referrer.ok_or_else(|| CoreError::ModuleNotFound {
            path: path.to_string(),
        })?;
        let dir = match referrer.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => "",
        };
        format!("{dir}/{path}")
    } else {
        path.to_string()
    };

    let absolute = combined.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in combined.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(CoreError::PathEscape {
                        path: path.to_string(),
                    });
                }
            }
            seg => segments.push(seg),
        }
    }
    let joined = segments.join("/");
    Ok(if absolute {
        format!("/{joined}")
    } else {
        joined
    })
}

/// Paths imported by a module source: `import ... from "x"`,
/// `import "x"`, `export ... from "x"`.
fn scan_imports(source: &str) -> Vec<String> {
    static IMPORT: OnceLock<Regex> = OnceLock::new();
    let re = IMPORT.get_or_init(|| {
        Regex::new(r#"(?m)^\s*(?:import|export)\b[^'"\n]*['"]([^'"]+)['"]"#).expect("import regex")
    });
    re.captures_iter(source)
        .map(|cap| cap[1].to_string())
        .collect()
}
