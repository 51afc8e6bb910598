use super::pipeline::{ComputePipeline, GraphicsPipeline};
use crate::graphics_helper::GraphicsHelper;
use karst_api::{KarstResult, NativeHandle};
use std::path::{Path, PathBuf};

/// Collects the native pipelines created during a run and persists the backend's opaque
/// cache blob for them, so the next run skips driver-side pipeline compilation.
///
/// The file lives at `<cache_root>/Cache/<name>.cache`; the root is supplied by the
/// application rather than resolved from any global path service.
pub struct PipelineCache {
    cache_name: String,
    cache_file: PathBuf,
    pipelines_to_cache: Vec<NativeHandle>,
}

impl PipelineCache {
    pub fn new(
        cache_root: &Path,
        cache_name: impl Into<String>,
    ) -> Self {
        let cache_name = cache_name.into();
        let cache_file = cache_root
            .join("Cache")
            .join(format!("{}.cache", cache_name));
        PipelineCache {
            cache_name,
            cache_file,
            pipelines_to_cache: Vec::new(),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    pub fn add_pipeline(
        &mut self,
        pipeline: &GraphicsPipeline,
    ) {
        self.pipelines_to_cache
            .extend_from_slice(pipeline.native_pipelines());
    }

    pub fn add_compute_pipeline(
        &mut self,
        pipeline: &ComputePipeline,
    ) {
        if let Some(native) = pipeline.native_pipeline() {
            self.pipelines_to_cache.push(native);
        }
    }

    pub fn pipelines_to_cache(&self) -> &[NativeHandle] {
        &self.pipelines_to_cache
    }

    /// The raw bytes persisted by a previous run. A missing file is the normal first-run
    /// case and yields an empty buffer, not an error.
    pub fn read_raw(&self) -> KarstResult<Vec<u8>> {
        match std::fs::read(&self.cache_file) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Asks the backend for the merged cache blob of every collected pipeline and writes
    /// it out, truncating any previous file.
    pub fn write_cache(
        &self,
        helper: &dyn GraphicsHelper,
    ) -> KarstResult<()> {
        let data = helper.pipeline_cache_data(&self.pipelines_to_cache)?;
        if let Some(parent) = self.cache_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.cache_file, &data)?;
        log::debug!(
            "wrote pipeline cache {} ({} bytes)",
            self.cache_file.display(),
            data.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{unique_temp_dir, TestGraphicsHelper};

    #[test]
    fn test_missing_file_reads_empty() {
        let cache_root = unique_temp_dir("karst_cache_missing");
        let cache = PipelineCache::new(&cache_root, "shaders");
        assert!(cache.read_raw().unwrap().is_empty());
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let cache_root = unique_temp_dir("karst_cache_write");
        let helper = TestGraphicsHelper::default();

        let mut cache = PipelineCache::new(&cache_root, "shaders");
        cache.pipelines_to_cache.push(NativeHandle(7));
        cache.write_cache(&helper).unwrap();

        assert_eq!(
            cache.cache_file(),
            cache_root.join("Cache").join("shaders.cache")
        );
        let data = cache.read_raw().unwrap();
        assert!(!data.is_empty());

        // A rewrite truncates rather than appends
        cache.write_cache(&helper).unwrap();
        assert_eq!(cache.read_raw().unwrap(), data);

        std::fs::remove_dir_all(&cache_root).ok();
    }
}
