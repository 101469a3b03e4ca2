// 미디어 URI 정규화
// content:// (호스트 리졸버 경유), file://, 스킴 없는 경로 → 코덱이 여는 로컬 경로

use crate::error::{EngineError, EngineResult};
use std::path::{Path, PathBuf};
use url::Url;

/// 파싱된 미디어 URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaUri {
    /// 로컬 파일 (file:// 또는 스킴 없음)
    File(PathBuf),
    /// 호스트 콘텐츠 참조 (content://...)
    Content(String),
}

impl MediaUri {
    pub fn parse(uri: &str) -> EngineResult<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(EngineError::UnsupportedUri("empty URI".to_string()));
        }

        // 스킴 없는 경로는 그대로 (퍼센트 디코딩 없음)
        if !uri.contains("://") {
            return Ok(Self::File(PathBuf::from(uri)));
        }

        let parsed = Url::parse(uri).map_err(|e| EngineError::UnsupportedUri(format!("{}: {}", uri, e)))?;
        match parsed.scheme() {
            "content" => Ok(Self::Content(uri.to_string())),
            // file:///abs/path, file://localhost/abs/path
            "file" => parsed
                .to_file_path()
                .map(Self::File)
                .map_err(|_| EngineError::UnsupportedUri(format!("invalid file URI {}", uri))),
            scheme => Err(EngineError::UnsupportedUri(format!("scheme '{}'", scheme))),
        }
    }
}

/// 로컬 경로를 file:// URI로 (스테이지 출력 형식, 예약 문자는 퍼센트 인코딩)
pub fn file_uri(path: &Path) -> EngineResult<String> {
    let absolute = std::path::absolute(path)?;
    Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|_| EngineError::UnsupportedUri(format!("not a file path: {}", path.display())))
}

/// content:// URI를 로컬 경로로 바꿔주는 호스트 측 리졸버
pub trait ContentResolver: Send + Sync {
    fn resolve(&self, uri: &str) -> Option<PathBuf>;
}

/// URI → 로컬 경로 (content 스킴은 리졸버 필수)
pub fn resolve_path(uri: &str, resolver: Option<&dyn ContentResolver>) -> EngineResult<PathBuf> {
    match MediaUri::parse(uri)? {
        MediaUri::File(path) => Ok(path),
        MediaUri::Content(content) => resolver
            .and_then(|r| r.resolve(&content))
            .ok_or_else(|| EngineError::UnsupportedUri(format!("unresolved content URI {}", content))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver;

    impl ContentResolver for FixedResolver {
        fn resolve(&self, uri: &str) -> Option<PathBuf> {
            uri.strip_prefix("content://media/").map(|rest| PathBuf::from("/proc/self/fd").join(rest))
        }
    }

    #[test]
    fn file_and_bare_paths_normalize() {
        assert_eq!(
            MediaUri::parse("file:///data/cache/temp_trim1.mp4").unwrap(),
            MediaUri::File(PathBuf::from("/data/cache/temp_trim1.mp4"))
        );
        assert_eq!(
            MediaUri::parse("/storage/Movies/Clipo/a.mp4").unwrap(),
            MediaUri::File(PathBuf::from("/storage/Movies/Clipo/a.mp4"))
        );
        assert_eq!(
            MediaUri::parse("file:///tmp/my%20clip.mp4").unwrap(),
            MediaUri::File(PathBuf::from("/tmp/my clip.mp4"))
        );
    }

    #[test]
    fn content_needs_resolver() {
        let uri = "content://media/42";
        assert!(matches!(resolve_path(uri, None), Err(EngineError::UnsupportedUri(_))));
        assert_eq!(
            resolve_path(uri, Some(&FixedResolver)).unwrap(),
            PathBuf::from("/proc/self/fd/42")
        );
    }

    #[test]
    fn unknown_scheme_rejected() {
        assert!(MediaUri::parse("https://example.com/a.mp4").is_err());
        assert!(MediaUri::parse("").is_err());
    }

    #[test]
    fn output_uri_round_trips() {
        let uri = file_uri(Path::new("/tmp/out.mp4")).unwrap();
        assert_eq!(uri, "file:///tmp/out.mp4");
        assert_eq!(MediaUri::parse(&uri).unwrap(), MediaUri::File(PathBuf::from("/tmp/out.mp4")));
    }

    #[test]
    fn reserved_characters_survive_round_trip() {
        for name in ["/tmp/a%20b.mp4", "/tmp/my clip.mp4", "/tmp/take#2.mp4", "/tmp/100% done?.mp4"] {
            let path = PathBuf::from(name);
            let uri = file_uri(&path).unwrap();
            assert!(!uri.contains(' ') && !uri.contains('#'), "{}", uri);
            assert_eq!(resolve_path(&uri, None).unwrap(), path, "{}", uri);
        }
    }

    #[test]
    fn relative_paths_become_absolute_uris() {
        let uri = file_uri(Path::new("cache/out.mp4")).unwrap();
        let path = resolve_path(&uri, None).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("cache/out.mp4"));
    }

    #[test]
    fn localhost_file_uri_accepted() {
        assert_eq!(
            resolve_path("file://localhost/tmp/a.mp4", None).unwrap(),
            PathBuf::from("/tmp/a.mp4")
        );
    }
}
