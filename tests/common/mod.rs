use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::fixture::ChildPath;
use assert_fs::prelude::*;

/// Config pointing at an exiftool that does not exist, so builds fall back to
/// file modification times whether or not exiftool is installed.
const TEST_CONFIG: &str = r#"
images_dir = "images"
exiftool_path = "/nonexistent/exiftool"
"#;

pub fn setup_workspace(temp_dir: &TempDir, files: &[&str]) -> ChildPath {
    temp_dir.child("picsort.toml").write_str(TEST_CONFIG).unwrap();
    let images = temp_dir.child("images");
    images.create_dir_all().unwrap();
    for name in files {
        images.child(name).write_binary(name.as_bytes()).unwrap();
    }
    images
}

pub fn picsort(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("picsort").unwrap();
    cmd.current_dir(temp_dir.path());
    cmd
}
