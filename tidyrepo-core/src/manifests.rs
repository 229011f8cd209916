//! Manifest parser registry.
//!
//! Each supported manifest filename maps to a small lexical extractor that
//! pulls dependency names out of raw text. Extractors never fail: malformed
//! or truncated input yields `None`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::domain::DependencySet;

/// Maximum number of Maven artifacts reported for one POM.
pub const MAX_POM_ARTIFACTS: usize = 20;

/// Known manifest formats, in the order they are probed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ManifestKind {
    /// npm `package.json`.
    PackageJson,
    /// pip `requirements.txt`.
    Requirements,
    /// pipenv `Pipfile`.
    Pipfile,
    /// PEP 621 `pyproject.toml`.
    Pyproject,
    /// Rust `Cargo.toml`.
    Cargo,
    /// Go `go.mod`.
    GoMod,
    /// Bundler `Gemfile`.
    Gemfile,
    /// Maven `pom.xml`.
    Pom,
    /// PHP `composer.json`.
    Composer,
}

impl ManifestKind {
    /// Every supported format in probe order.
    pub const ALL: [ManifestKind; 9] = [
        ManifestKind::PackageJson,
        ManifestKind::Requirements,
        ManifestKind::Pipfile,
        ManifestKind::Pyproject,
        ManifestKind::Cargo,
        ManifestKind::GoMod,
        ManifestKind::Gemfile,
        ManifestKind::Pom,
        ManifestKind::Composer,
    ];

    /// Resolve a manifest kind from an exact filename.
    pub fn from_filename(filename: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.filename() == filename)
    }

    /// Filename the format is stored under at the repository root.
    pub fn filename(&self) -> &'static str {
        match self {
            ManifestKind::PackageJson => "package.json",
            ManifestKind::Requirements => "requirements.txt",
            ManifestKind::Pipfile => "Pipfile",
            ManifestKind::Pyproject => "pyproject.toml",
            ManifestKind::Cargo => "Cargo.toml",
            ManifestKind::GoMod => "go.mod",
            ManifestKind::Gemfile => "Gemfile",
            ManifestKind::Pom => "pom.xml",
            ManifestKind::Composer => "composer.json",
        }
    }

    /// Extract dependency names from raw manifest text.
    pub fn parse(&self, raw: &str) -> Option<DependencySet> {
        match self {
            ManifestKind::PackageJson => {
                parse_json_groups(raw, &["dependencies", "devDependencies", "scripts"])
            }
            ManifestKind::Requirements => flat(parse_requirements(raw)),
            ManifestKind::Pipfile => flat(parse_pipfile(raw)),
            ManifestKind::Pyproject => flat(parse_pyproject(raw)),
            ManifestKind::Cargo => flat(parse_cargo_toml(raw)),
            ManifestKind::GoMod => flat(parse_go_mod(raw)),
            ManifestKind::Gemfile => flat(parse_gemfile(raw)),
            ManifestKind::Pom => flat(parse_pom(raw)),
            ManifestKind::Composer => parse_json_groups(raw, &["require", "require-dev"]),
        }
    }
}

/// Filenames of every supported manifest, in probe order.
pub fn manifest_filenames() -> impl Iterator<Item = &'static str> {
    ManifestKind::ALL.into_iter().map(|kind| kind.filename())
}

/// Parse a manifest by filename; unknown filenames are not attempted.
pub fn parse(filename: &str, raw: &str) -> Option<DependencySet> {
    ManifestKind::from_filename(filename)?.parse(raw)
}

fn flat(names: Vec<String>) -> Option<DependencySet> {
    if names.is_empty() {
        None
    } else {
        Some(DependencySet::FlatList(names))
    }
}

/// Take the keys of the named object members of a JSON document.
///
/// A document that decodes to an object always yields every group, even
/// when a group is empty or not an object.
fn parse_json_groups(raw: &str, groups: &[&str]) -> Option<DependencySet> {
    let document: Value = serde_json::from_str(raw).ok()?;
    let object = document.as_object()?;
    let mut result = BTreeMap::new();
    for group in groups {
        let names = object
            .get(*group)
            .and_then(Value::as_object)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default();
        result.insert((*group).to_string(), names);
    }
    Some(DependencySet::GroupedMap(result))
}

/// Anything that can follow a requirement name: version operators, extras,
/// environment markers, `name @ url` references, and trailing comments.
const NAME_TERMINATORS: [&str; 13] = [
    "==", ">=", "<=", "~=", "!=", "<", ">", "[", ";", "@", "#", " ", "\t",
];

/// Cut a requirement down to its name.
fn strip_version(spec: &str) -> &str {
    let cut = NAME_TERMINATORS
        .iter()
        .filter_map(|marker| spec.find(marker))
        .min()
        .unwrap_or(spec.len());
    spec[..cut].trim()
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#')
}

fn is_section_header(line: &str) -> bool {
    line.starts_with('[')
}

fn parse_requirements(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_comment(line))
        .map(strip_version)
        .filter(|name| is_package_name(name))
        .map(String::from)
        .collect()
}

/// PyPI-style names: alphanumerics plus `-`, `_`, `.`, starting alphanumeric.
fn is_package_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Collect `key = value` keys from the body of one `[section]`.
fn section_keys(raw: &str, header: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut inside = false;
    for line in raw.lines() {
        if !inside {
            inside = line.contains(header);
            continue;
        }
        if is_section_header(line) {
            break;
        }
        let trimmed = line.trim();
        if is_comment(trimmed) {
            continue;
        }
        if let Some((key, _)) = trimmed.split_once('=') {
            let key = key.trim().trim_matches('"').trim_matches('\'');
            if !key.is_empty() {
                keys.push(key.to_string());
            }
        }
    }
    keys
}

fn parse_pipfile(raw: &str) -> Vec<String> {
    section_keys(raw, "[packages]")
}

fn parse_cargo_toml(raw: &str) -> Vec<String> {
    section_keys(raw, "[dependencies]")
}

fn first_quoted(line: &str, quote: char) -> Option<&str> {
    let mut parts = line.split(quote);
    parts.next()?;
    parts.next()
}

fn parse_pyproject(raw: &str) -> Vec<String> {
    let mut deps = Vec::new();
    let mut lines = raw.lines();

    let Some(header) = lines
        .by_ref()
        .find(|line| line.contains("dependencies") && line.contains('='))
    else {
        return deps;
    };

    // `dependencies = ["a", "b"]` on a single line.
    if let Some((_, value)) = header.split_once('=') {
        if value.contains('[') && value.contains(']') {
            let inline = value.split('"').skip(1).step_by(2);
            return inline
                .map(strip_version)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }
    }

    for line in lines {
        let trimmed = line.trim();
        if trimmed.starts_with(']') || (is_section_header(trimmed) && trimmed.ends_with(']')) {
            break;
        }
        if let Some(entry) = first_quoted(trimmed, '"') {
            let name = strip_version(entry);
            if !name.is_empty() {
                deps.push(name.to_string());
            }
        }
    }
    deps
}

fn parse_go_mod(raw: &str) -> Vec<String> {
    let mut deps = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        let candidate = if let Some(rest) = trimmed.strip_prefix("require") {
            rest
        } else if line.starts_with('\t') {
            trimmed
        } else {
            continue;
        };
        if let Some(module) = candidate.split_whitespace().next() {
            if module.contains('/') {
                deps.push(module.to_string());
            }
        }
    }
    deps
}

fn parse_gemfile(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| line.starts_with("gem "))
        .filter_map(|line| {
            let quote = line.chars().find(|c| *c == '\'' || *c == '"')?;
            first_quoted(line, quote)
        })
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

fn artifact_pattern() -> &'static Regex {
    static ARTIFACT_ID: OnceLock<Regex> = OnceLock::new();
    ARTIFACT_ID.get_or_init(|| {
        Regex::new(r"<artifactId>([^<]+)</artifactId>").expect("artifactId pattern is valid")
    })
}

fn parse_pom(raw: &str) -> Vec<String> {
    artifact_pattern()
        .captures_iter(raw)
        .filter_map(|captures| captures.get(1))
        .map(|artifact| artifact.as_str().trim().to_string())
        .take(MAX_POM_ARTIFACTS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_names(set: Option<DependencySet>) -> Vec<String> {
        match set {
            Some(DependencySet::FlatList(names)) => names,
            other => panic!("expected flat list, got {other:?}"),
        }
    }

    fn groups(set: Option<DependencySet>) -> BTreeMap<String, Vec<String>> {
        match set {
            Some(DependencySet::GroupedMap(mut groups)) => {
                groups.values_mut().for_each(|names| names.sort());
                groups
            }
            other => panic!("expected grouped map, got {other:?}"),
        }
    }

    #[test]
    fn registry_resolves_known_filenames_only() {
        assert_eq!(
            ManifestKind::from_filename("Cargo.toml"),
            Some(ManifestKind::Cargo)
        );
        assert_eq!(ManifestKind::from_filename("cargo.toml"), None);
        assert!(parse("setup.py", "install_requires=['x']").is_none());
        assert_eq!(manifest_filenames().count(), 9);
        assert_eq!(manifest_filenames().next(), Some("package.json"));
    }

    #[test]
    fn package_json_yields_three_groups() {
        let raw = r#"{
            "name": "demo",
            "dependencies": {"react": "^18", "next": "14"},
            "devDependencies": {"jest": "29"},
            "scripts": {"build": "next build", "test": "jest"}
        }"#;
        let groups = groups(parse("package.json", raw));
        assert_eq!(groups["dependencies"], vec!["next", "react"]);
        assert_eq!(groups["devDependencies"], vec!["jest"]);
        assert_eq!(groups["scripts"], vec!["build", "test"]);
    }

    #[test]
    fn package_json_keeps_empty_groups_and_ignores_non_objects() {
        let groups = groups(parse("package.json", r#"{"dependencies": ["odd"]}"#));
        assert_eq!(groups.len(), 3);
        assert!(groups.values().all(Vec::is_empty));
    }

    #[test]
    fn composer_json_yields_two_groups() {
        let raw = r#"{"require": {"php": ">=8.1", "laravel/framework": "^10"}, "require-dev": {"phpunit/phpunit": "^10"}}"#;
        let groups = groups(parse("composer.json", raw));
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["require", "require-dev"]);
        assert_eq!(groups["require"], vec!["laravel/framework", "php"]);
        assert_eq!(groups["require-dev"], vec!["phpunit/phpunit"]);
    }

    #[test]
    fn requirements_strip_versions_and_extras() {
        let raw = "# web\nflask==2.0.1\nrequests>=2.28\n\nuvicorn[standard]<=0.30\nnumpy ~= 1.26\npytz\n";
        assert_eq!(
            flat_names(parse("requirements.txt", raw)),
            vec!["flask", "requests", "uvicorn", "numpy", "pytz"]
        );
    }

    #[test]
    fn requirements_keep_commented_and_url_lines() {
        let raw = "flask  # web framework\ndjango==4.2\nrequests @ https://example.com/requests.whl\nhttpx@git+https://example.com/httpx\n-e .\n";
        assert_eq!(
            flat_names(parse("requirements.txt", raw)),
            vec!["flask", "django", "requests", "httpx"]
        );
    }

    #[test]
    fn pipfile_reads_only_packages_section() {
        let raw = "[[source]]\nurl = \"https://pypi.org/simple\"\n\n[packages]\n\"django\" = \"*\"\nrequests = \">=2\"\n# note = \"skip\"\n\n[dev-packages]\npytest = \"*\"\n";
        assert_eq!(flat_names(parse("Pipfile", raw)), vec!["django", "requests"]);
    }

    #[test]
    fn pipfile_without_packages_section_is_empty() {
        assert!(parse("Pipfile", "[dev-packages]\npytest = \"*\"\n").is_none());
    }

    #[test]
    fn pyproject_collects_multiline_dependency_array() {
        let raw = "[project]\nname = \"demo\"\ndependencies = [\n    \"fastapi>=0.100\",\n    \"pydantic==2.5\",\n    \"httpx\",\n]\n\n[tool.black]\nline-length = 100\n";
        assert_eq!(
            flat_names(parse("pyproject.toml", raw)),
            vec!["fastapi", "pydantic", "httpx"]
        );
    }

    #[test]
    fn pyproject_handles_inline_array() {
        let raw = "[project]\ndependencies = [\"rich>=13\", \"typer\"]\n";
        assert_eq!(flat_names(parse("pyproject.toml", raw)), vec!["rich", "typer"]);
    }

    #[test]
    fn pyproject_without_dependencies_is_empty() {
        assert!(parse("pyproject.toml", "[tool.poetry.dependencies]\npython = \"^3.11\"\n").is_none());
    }

    #[test]
    fn cargo_toml_reads_dependencies_section() {
        let raw = "[package]\nname = \"demo\"\nversion = \"0.1.0\"\n\n[dependencies]\nserde = { version = \"1\", features = [\"derive\"] }\ntokio = \"1\"\n\n[dev-dependencies]\nmockall = \"0.12\"\n";
        assert_eq!(flat_names(parse("Cargo.toml", raw)), vec!["serde", "tokio"]);
    }

    #[test]
    fn go_mod_reads_single_and_block_requires() {
        let raw = "module github.com/tidy/demo\n\ngo 1.22\n\nrequire github.com/spf13/cobra v1.8.0\n\nrequire (\n\tgithub.com/pkg/errors v0.9.1\n\tgolang.org/x/sync v0.6.0 // indirect\n)\n";
        assert_eq!(
            flat_names(parse("go.mod", raw)),
            vec![
                "github.com/spf13/cobra",
                "github.com/pkg/errors",
                "golang.org/x/sync"
            ]
        );
    }

    #[test]
    fn gemfile_extracts_first_quoted_token() {
        let raw = "source 'https://rubygems.org'\ngem 'rails', '~> 7.1'\ngem \"puma\"\n  gem 'pg'\n# gem 'old'\n";
        assert_eq!(flat_names(parse("Gemfile", raw)), vec!["rails", "puma", "pg"]);
    }

    #[test]
    fn pom_artifacts_are_capped() {
        let mut raw = String::from("<project><artifactId>root</artifactId><dependencies>");
        for index in 0..30 {
            raw.push_str(&format!(
                "<dependency><artifactId>lib-{index}</artifactId></dependency>"
            ));
        }
        raw.push_str("</dependencies></project>");
        let names = flat_names(parse("pom.xml", &raw));
        assert_eq!(names.len(), MAX_POM_ARTIFACTS);
        assert_eq!(names[0], "root");
        assert_eq!(names[1], "lib-0");
    }

    #[test]
    fn malformed_input_never_panics_and_yields_nothing() {
        let garbage = ["", "{", "{\"dependencies\": {", "\u{0}\u{1}[[[", "<artifactId>", "]]]"];
        for filename in manifest_filenames() {
            for raw in garbage {
                let parsed = parse(filename, raw);
                assert!(
                    parsed.is_none(),
                    "{filename} produced {parsed:?} for {raw:?}"
                );
            }
        }
    }
}
