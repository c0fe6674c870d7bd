//! `image_processing` mount: run a repository's main.py over an input image in Docker

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rmcp::{
    tool, tool_router, tool_handler, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    ErrorData as McpError,
    service::RequestContext,
    RoleServer,
};
use serde_json::{json, Value};
use std::future::Future;
use std::path::Path;
use tracing::{info, warn};

use super::git_clone_tools::clone_repo;
use super::templates::DOCKERFILE_IMAGE_PROCESSING;
use super::types::*;
use super::{json_result, repo_name_from_url, unique_name, validate_github_url, validate_plain_name};
use crate::config::Config;
use crate::docker_client::{self, RunSpec};
use crate::error::{Result, ToolError};

const TOOL_COUNT: usize = 2;

/// Images at or above this size are not inlined
pub const MAX_INLINE_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];

/// Lowercased extension if the file is one of the collected image types
pub fn image_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

pub fn mime_type(ext: &str) -> String {
    match ext {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        other => format!("image/{}", other),
    }
}

/// Named, self-removing run of the contest image with `/input` and `/output` mounted
pub fn contest_run_spec(image_tag: &str, container_name: &str, input_dir: &Path, output_dir: &Path) -> RunSpec {
    RunSpec::new(image_tag)
        .name(container_name)
        .auto_remove()
        .volume(input_dir.display().to_string(), "/input")
        .volume(output_dir.display().to_string(), "/output")
}

/// Image processing tool handler
#[derive(Clone)]
pub struct ImageProcessingToolHandler {
    tool_router: ToolRouter<ImageProcessingToolHandler>,
    config: Config,
}

impl ImageProcessingToolHandler {
    pub fn new(config: Config) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn run_contest(&self, args: RunImageProcessingArgs) -> Result<Value> {
        validate_github_url(&args.github_url)?;
        validate_plain_name(&args.image_filename, "image file name")?;
        let input_image = Path::new(&args.input_image_path);
        if !input_image.is_file() {
            return Err(ToolError::invalid(format!("Input image not found: {}", args.input_image_path)));
        }

        let repo = repo_name_from_url(&args.github_url);
        let run_dir = self.config.image_runs_dir().join(&repo);
        let code_dir = run_dir.join("code");
        let input_dir = run_dir.join("input");
        let output_dir = run_dir.join("output");

        if code_dir.exists() {
            info!("Removing existing code directory {}", code_dir.display());
            tokio::fs::remove_dir_all(&code_dir).await?;
        }
        for dir in [&input_dir, &output_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }

        clone_repo(&args.github_url, &code_dir, self.config.command_timeout).await?;
        tokio::fs::copy(input_image, input_dir.join(&args.image_filename)).await?;
        tokio::fs::write(run_dir.join("Dockerfile"), DOCKERFILE_IMAGE_PROCESSING).await?;

        let image_tag = format!("{}-image:latest", repo.to_lowercase());
        docker_client::build_image(&image_tag, &run_dir, Some(self.config.build_timeout))
            .await
            .map_err(|e| ToolError::from(e).context("Image processing contest failed"))?;

        // bind mounts need absolute host paths
        let input_abs = tokio::fs::canonicalize(&input_dir).await?;
        let output_abs = tokio::fs::canonicalize(&output_dir).await?;
        let container_name = unique_name(&format!("{}-image", repo.to_lowercase()));
        let spec = contest_run_spec(&image_tag, &container_name, &input_abs, &output_abs);
        let run = match docker_client::run_attached(&spec, Some(self.config.build_timeout)).await {
            Ok(run) => run,
            Err(e) => {
                // a killed `docker run` leaves the container behind
                docker_client::force_remove(&container_name).await;
                return Err(ToolError::from(e).context("Image processing contest failed"));
            }
        };
        info!("{} finished: {}", image_tag, run.stdout.trim());

        let mut output_files = Vec::new();
        let mut entries = tokio::fs::read_dir(&output_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            output_files.push(entry.file_name().to_string_lossy().to_string());
        }
        output_files.sort();

        Ok(json!({
            "status": "success",
            "output_files": output_files,
            "output_path": output_abs.display().to_string(),
        }))
    }

    async fn collect_images(&self, repo_name: &str) -> Result<Value> {
        validate_plain_name(repo_name, "repository name")?;
        let output_dir = self.config.image_runs_dir().join(repo_name).join("output");
        if !output_dir.is_dir() {
            return Err(ToolError::invalid(format!("Output directory not found: {}", output_dir.display())));
        }

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&output_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut images = Vec::new();
        for path in paths {
            let Some(ext) = image_extension(&path) else { continue };
            let size = tokio::fs::metadata(&path).await?.len();
            let filename = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            if size >= MAX_INLINE_IMAGE_BYTES {
                warn!("Skipping {} ({} bytes): too large for base64 encoding", filename, size);
                continue;
            }
            let data = tokio::fs::read(&path).await?;
            images.push(json!({
                "filename": filename,
                "file_size": size,
                "file_extension": format!(".{}", ext),
                "base64_data": STANDARD.encode(&data),
                "mime_type": mime_type(&ext),
            }));
        }
        info!("Prepared {} images from {}", images.len(), output_dir.display());

        Ok(json!({
            "status": "success",
            "repo_name": repo_name,
            "output_path": output_dir.display().to_string(),
            "image_count": images.len(),
            "images": images,
            "message": "Image data ready for agent consumption",
        }))
    }
}

impl Default for ImageProcessingToolHandler {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[tool_router]
impl ImageProcessingToolHandler {
    #[tool(description = "Clone a repository, build it into an image with OpenCV/numpy/pillow and run its main.py with /input and /output mounted")]
    async fn run_image_processing(&self, Parameters(args): Parameters<RunImageProcessingArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.run_contest(args).await?)
    }

    #[tool(description = "Return the output images of a run as base64 (files under 5 MiB)")]
    async fn get_output_images_data(&self, Parameters(args): Parameters<OutputImagesArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.collect_images(&args.repo_name).await?)
    }
}

#[tool_handler]
impl ServerHandler for ImageProcessingToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "Image Processing MCP Server. {} tools available: \
                 run_image_processing, get_output_images_data.",
                TOOL_COUNT,
            )),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("Image Processing MCP server initialized with {} tools", TOOL_COUNT);
        Ok(self.get_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_text(result: &CallToolResult) -> &str {
        result.content[0].as_text().expect("expected text content").text.as_str()
    }

    fn handler_in(dir: &Path) -> ImageProcessingToolHandler {
        ImageProcessingToolHandler::new(Config {
            work_dir: dir.to_path_buf(),
            ..Config::default()
        })
    }

    #[test]
    fn test_image_extension_filter() {
        assert_eq!(image_extension(Path::new("out/result.PNG")), Some("png".to_string()));
        assert_eq!(image_extension(Path::new("photo.jpeg")), Some("jpeg".to_string()));
        assert_eq!(image_extension(Path::new("notes.txt")), None);
        assert_eq!(image_extension(Path::new("README")), None);
        assert_eq!(mime_type("jpg"), "image/jpeg");
        assert_eq!(mime_type("gif"), "image/gif");
    }

    #[test]
    fn test_contest_run_is_named_for_cleanup() {
        let args = contest_run_spec(
            "repo-image:latest",
            "repo-image-0a1b2c3d",
            Path::new("/runs/repo/input"),
            Path::new("/runs/repo/output"),
        )
        .to_args();
        assert_eq!(
            args,
            vec![
                "run", "--rm",
                "--name", "repo-image-0a1b2c3d",
                "-v", "/runs/repo/input:/input",
                "-v", "/runs/repo/output:/output",
                "repo-image:latest",
            ]
        );
    }

    #[tokio::test]
    async fn test_collect_images_encodes_small_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("image_contest_runs/repo/output");
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("b.png"), [0x89, b'P', b'N', b'G']).unwrap();
        std::fs::write(output.join("a.jpg"), b"jpg").unwrap();
        std::fs::write(output.join("log.txt"), b"not an image").unwrap();

        let result = handler_in(dir.path())
            .get_output_images_data(Parameters(OutputImagesArgs { repo_name: "repo".to_string() }))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(extract_text(&result)).unwrap();
        assert_eq!(body["image_count"], 2);
        assert_eq!(body["images"][0]["filename"], "a.jpg");
        assert_eq!(body["images"][0]["base64_data"], "anBn");
        assert_eq!(body["images"][0]["mime_type"], "image/jpeg");
        assert_eq!(body["images"][1]["file_extension"], ".png");
        assert_eq!(body["images"][1]["file_size"], 4);
    }

    #[tokio::test]
    async fn test_collect_images_skips_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("image_contest_runs/repo/output");
        std::fs::create_dir_all(&output).unwrap();
        let big = std::fs::File::create(output.join("big.png")).unwrap();
        big.set_len(MAX_INLINE_IMAGE_BYTES).unwrap();

        let result = handler_in(dir.path())
            .get_output_images_data(Parameters(OutputImagesArgs { repo_name: "repo".to_string() }))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(extract_text(&result)).unwrap();
        assert_eq!(body["image_count"], 0);
    }

    #[tokio::test]
    async fn test_collect_images_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let err = handler_in(dir.path())
            .get_output_images_data(Parameters(OutputImagesArgs { repo_name: "../etc".to_string() }))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_run_rejects_bad_image_filename() {
        let dir = tempfile::tempdir().unwrap();
        let err = handler_in(dir.path())
            .run_image_processing(Parameters(RunImageProcessingArgs {
                github_url: "https://github.com/user/repo.git".to_string(),
                image_filename: "../../escape.png".to_string(),
                input_image_path: "./sample_problems/input.png".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(!dir.path().join("image_contest_runs").exists());
    }
}
