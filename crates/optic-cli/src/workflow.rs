//! End-to-end client workflows: request, decode, annotate, persist.

use crate::config::Config;
use image::{DynamicImage, RgbImage};
use optic_api::{ApiClient, ApiError, Endpoint, RemoteScorer};
use optic_core::decoder::{self, DecodeError};
use optic_core::{GalleryEntry, GalleryError, IdentityResolver, MatchResult};
use optic_render::{save_annotated, Annotator, Directive, RenderError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("failed to load image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Gallery(#[from] GalleryError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Result of a face registration.
pub struct RegisterOutcome {
    /// Gallery entries appended.
    pub registered: usize,
    pub output: Option<PathBuf>,
}

/// One face from a verification, with its resolved identity.
pub struct IdentifiedFace {
    pub index: usize,
    pub confidence: f32,
    pub identity: MatchResult,
}

pub struct VerifyOutcome {
    pub faces: Vec<IdentifiedFace>,
    pub output: Option<PathBuf>,
}

/// Result of a classification, detection or pose workflow.
pub struct DetectOutcome {
    /// `(label, confidence)` per drawn detection. For poses, the confidence
    /// is the pose's best keypoint.
    pub detections: Vec<(String, f32)>,
    pub output: Option<PathBuf>,
}

/// Shared state for all workflows against one server.
pub struct Pipeline {
    config: Config,
    client: ApiClient,
    annotator: Annotator,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self, WorkflowError> {
        let client = ApiClient::new(config.client_options())?;
        let annotator = Annotator::load(config.font_path.as_deref())?;
        Ok(Self {
            config,
            client,
            annotator,
        })
    }

    /// Embed every face in `image_path` and add the confident ones to the
    /// gallery under `name`. Boxes are drawn; labels are not.
    pub async fn register_face(
        &self,
        image_path: &Path,
        name: &str,
    ) -> Result<RegisterOutcome, WorkflowError> {
        let image = load_image(image_path)?;
        let raw = self.client.post_image(Endpoint::FaceEmbedding, &image).await?;
        tracing::debug!(response = %raw, "face2embedding response");
        let faces = decoder::decode_faces(&raw, self.config.thresholds.face)?;

        let gallery = self.config.gallery();
        let mut directives = Vec::with_capacity(faces.len());
        for face in &faces {
            directives.push(Directive::Box(face.bbox));
            gallery.append(GalleryEntry {
                name: name.to_string(),
                embeddings: face.embedding.clone(),
            })?;
            tracing::info!(name, face = face.index + 1, confidence = face.confidence, "face registered");
        }
        if faces.is_empty() {
            tracing::warn!(name, "no face above the confidence threshold; nothing registered");
        }

        let output = self.finish(&image, image_path, &directives)?;
        Ok(RegisterOutcome {
            registered: faces.len(),
            output,
        })
    }

    /// Embed every face in `image_path` and resolve each confident one
    /// against the gallery.
    pub async fn verify_face(&self, image_path: &Path) -> Result<VerifyOutcome, WorkflowError> {
        let image = load_image(image_path)?;
        let raw = self.client.post_image(Endpoint::FaceEmbedding, &image).await?;
        let faces = decoder::decode_faces(&raw, self.config.thresholds.face)?;

        let resolver = IdentityResolver::new(
            self.config.gallery(),
            RemoteScorer::new(self.client.clone()),
            self.config.thresholds.face_match,
        );

        let mut directives = Vec::with_capacity(faces.len() * 2);
        let mut identified = Vec::with_capacity(faces.len());
        for face in &faces {
            directives.push(Directive::Box(face.bbox));
            let identity = resolver.resolve(&face.embedding).await?;
            directives.push(Directive::Label {
                text: format!("{}{} {:.6}", identity.name, face.index + 1, face.confidence),
                left: face.bbox.left as i32,
                top: face.bbox.top as i32,
            });
            identified.push(IdentifiedFace {
                index: face.index,
                confidence: face.confidence,
                identity,
            });
        }

        let output = self.finish(&image, image_path, &directives)?;
        Ok(VerifyOutcome {
            faces: identified,
            output,
        })
    }

    pub async fn classify_image(&self, image_path: &Path) -> Result<DetectOutcome, WorkflowError> {
        let image = load_image(image_path)?;
        let raw = self.client.post_image(Endpoint::ClassifyImage, &image).await?;
        let classes = decoder::decode_classes(&raw, self.config.thresholds.class)?;

        let directives: Vec<Directive> = classes
            .iter()
            .map(|c| Directive::Caption(format!("{} {:.6}", c.label, c.confidence)))
            .collect();
        let detections = classes.into_iter().map(|c| (c.label, c.confidence)).collect();

        let output = self.finish(&image, image_path, &directives)?;
        Ok(DetectOutcome { detections, output })
    }

    pub async fn detect_objects(&self, image_path: &Path) -> Result<DetectOutcome, WorkflowError> {
        let image = load_image(image_path)?;
        let raw = self.client.post_image(Endpoint::DetectObjects, &image).await?;
        let objects = decoder::decode_objects(&raw, self.config.thresholds.object)?;

        let mut directives = Vec::with_capacity(objects.len() * 2);
        for object in &objects {
            directives.push(Directive::Box(object.bbox));
            directives.push(Directive::Label {
                text: format!("{} {:.6}", object.label, object.confidence),
                left: object.bbox.left as i32,
                top: object.bbox.top as i32,
            });
        }
        let detections = objects.into_iter().map(|o| (o.label, o.confidence)).collect();

        let output = self.finish(&image, image_path, &directives)?;
        Ok(DetectOutcome { detections, output })
    }

    pub async fn estimate_pose(&self, image_path: &Path) -> Result<DetectOutcome, WorkflowError> {
        let image = load_image(image_path)?;
        let raw = self.client.post_image(Endpoint::EstimatePose, &image).await?;
        let threshold = self.config.thresholds.pose_keypoint;
        let poses = decoder::decode_poses(&raw, threshold)?;

        let detections = poses
            .iter()
            .map(|p| {
                let visible = p.confident_points(threshold).count();
                let best = p.points.iter().map(|k| k.confidence).fold(0.0f32, f32::max);
                (format!("pose{} ({visible} keypoints)", p.index + 1), best)
            })
            .collect();
        let directives: Vec<Directive> = poses
            .into_iter()
            .map(|pose| Directive::Pose { pose, threshold })
            .collect();

        let output = self.finish(&image, image_path, &directives)?;
        Ok(DetectOutcome { detections, output })
    }

    /// Annotate a copy of `image` and save it when saving is enabled.
    fn finish(
        &self,
        image: &DynamicImage,
        image_path: &Path,
        directives: &[Directive],
    ) -> Result<Option<PathBuf>, WorkflowError> {
        if !self.config.save {
            return Ok(None);
        }
        let source: RgbImage = image.to_rgb8();
        let frame = self.annotator.annotate(&source, directives);
        let path = save_annotated(&frame, image_path, &self.config.output_dir)?;
        Ok(Some(path))
    }
}

fn load_image(path: &Path) -> Result<DynamicImage, WorkflowError> {
    let image = image::open(path).map_err(|source| WorkflowError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), width = image.width(), height = image.height(), "loaded input image");
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use optic_core::UNKNOWN_IDENTITY;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const FACE_RESPONSE: &str = r#"{"result":{"faces":[
        {"confidence":0.97,"boundingBox":{"top":4,"left":4,"width":16,"height":16},"embeddings":[0.11,0.22,0.33]},
        {"confidence":0.20,"boundingBox":{"top":1,"left":1,"width":2,"height":2},"embeddings":[0.9,0.9,0.9]}
    ]}}"#;

    /// Answer `bodies.len()` sequential requests with the given JSON bodies.
    async fn serve_sequence(bodies: Vec<&'static str>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut paths = Vec::new();
            for body in bodies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                let path = request.split_whitespace().nth(1).unwrap_or_default().to_string();
                paths.push(path);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
            paths
        });
        (format!("http://{addr}"), handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let len = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn fixture(dir: &Path, server_url: String) -> (Pipeline, PathBuf) {
        let input = dir.join("faces.png");
        RgbImage::from_pixel(32, 32, image::Rgb([200, 200, 200]))
            .save(&input)
            .unwrap();
        let config = Config {
            server_url,
            output_dir: dir.join("output"),
            font_path: None,
            ..Config::default()
        };
        (Pipeline::new(config).unwrap(), input)
    }

    #[tokio::test]
    async fn test_register_then_verify_resolves_name() {
        let dir = tempfile::tempdir().unwrap();
        let (url, server) = serve_sequence(vec![
            FACE_RESPONSE,
            FACE_RESPONSE,
            r#"{"result":{"confidence":0.095}}"#,
        ])
        .await;
        let (pipeline, input) = fixture(dir.path(), url);

        let registered = pipeline.register_face(&input, "Person1").await.unwrap();
        assert_eq!(registered.registered, 1);
        assert_eq!(
            registered.output.as_deref(),
            Some(dir.path().join("output/result_faces.png").as_path())
        );

        let entries = pipeline.config.gallery().load().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Person1");
        assert_eq!(entries[0].embeddings.values, vec![0.11, 0.22, 0.33]);

        let verified = pipeline.verify_face(&input).await.unwrap();
        assert_eq!(verified.faces.len(), 1);
        assert_eq!(verified.faces[0].index, 0);
        assert_eq!(verified.faces[0].identity.name, "Person1");

        let paths = server.await.unwrap();
        assert_eq!(paths, vec!["/v1/face2embedding", "/v1/face2embedding", "/v1/compareface"]);
    }

    #[tokio::test]
    async fn test_verify_with_empty_gallery_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let (url, _server) = serve_sequence(vec![FACE_RESPONSE]).await;
        let (pipeline, input) = fixture(dir.path(), url);

        let verified = pipeline.verify_face(&input).await.unwrap();
        assert_eq!(verified.faces[0].identity.name, UNKNOWN_IDENTITY);
    }

    #[tokio::test]
    async fn test_server_error_aborts_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let (url, _server) =
            serve_sequence(vec![r#"{"error":{"code":500,"message":"model not loaded"}}"#]).await;
        let (pipeline, input) = fixture(dir.path(), url);

        let err = pipeline.detect_objects(&input).await.err().unwrap();
        assert!(matches!(err, WorkflowError::Decode(DecodeError::Server { code: 500, .. })));
        assert!(!dir.path().join("output/result_faces.png").exists());
    }

    #[tokio::test]
    async fn test_classify_keeps_confident_classes() {
        let dir = tempfile::tempdir().unwrap();
        let (url, _server) = serve_sequence(vec![
            r#"{"result":{"classes":[{"confidence":0.8,"class":"cat"},{"confidence":0.1,"class":"dog"}]}}"#,
        ])
        .await;
        let (pipeline, input) = fixture(dir.path(), url);

        let outcome = pipeline.classify_image(&input).await.unwrap();
        assert_eq!(outcome.detections.len(), 1);
        assert_eq!(outcome.detections[0].0, "cat");
        assert!(outcome.output.unwrap().exists());
    }

    #[tokio::test]
    async fn test_pose_without_save_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (url, _server) = serve_sequence(vec![
            r#"{"result":{"poses":[{"points":[{"x":5,"y":5,"confidence":0.9},{"x":9,"y":5,"confidence":0.9}]}]}}"#,
        ])
        .await;
        let (mut pipeline, input) = fixture(dir.path(), url);
        pipeline.config.save = false;

        let outcome = pipeline.estimate_pose(&input).await.unwrap();
        assert_eq!(outcome.detections.len(), 1);
        assert!(outcome.output.is_none());
        assert!(!dir.path().join("output").exists());
    }

    #[tokio::test]
    async fn test_missing_image_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = fixture(dir.path(), "http://127.0.0.1:9".into());
        let err = pipeline
            .classify_image(&dir.path().join("missing.jpg"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, WorkflowError::Image { .. }));
    }
}
