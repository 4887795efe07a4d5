//! # CLI Tests
//!
//! Runs the `biopsy-vision` binary against images written to a temporary
//! directory and checks the JSON it produces.

#[cfg(test)]
mod tests {
    use biopsy_vision::synthetic::create_synthetic_test_image;
    use std::path::Path;
    use std::process::{Command, Output};
    use tempfile::TempDir;

    fn run_cli(args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_biopsy-vision"))
            .args(args)
            .env("ENVIRONMENT", "test")
            .env("LOG_LEVEL", "warn")
            .output()
            .expect("failed to run biopsy-vision")
    }

    fn write_synthetic(dir: &Path) -> String {
        let path = dir.join("synthetic.png");
        create_synthetic_test_image().save(&path).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_analyze_writes_result_and_overlay() {
        let dir = TempDir::new().unwrap();
        let image = write_synthetic(dir.path());
        let output_path = dir.path().join("result.json");
        let overlay_path = dir.path().join("overlay.jpg");

        let output = run_cli(&[
            "analyze",
            &image,
            "--pixels-per-mm",
            "4",
            "--output",
            output_path.to_str().unwrap(),
            "--overlay",
            overlay_path.to_str().unwrap(),
        ]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let json = std::fs::read_to_string(&output_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["grid_detection"]["method"], "manual_calibration");

        let overlay = image::open(&overlay_path).unwrap();
        assert_eq!((overlay.width(), overlay.height()), (800, 600));
    }

    #[test]
    fn test_methods_prints_catalog() {
        let output = run_cli(&["methods"]);
        assert!(output.status.success());
        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value["segmentation"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_calibrate_without_object_uses_fallback() {
        let dir = TempDir::new().unwrap();
        let image = write_synthetic(dir.path());
        let output = run_cli(&["calibrate", &image]);
        assert!(output.status.success());
        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert!(value["pixels_per_mm"].as_f64().unwrap() > 0.0);
        assert!(value["method"].as_str().unwrap().starts_with("fallback"));
    }

    #[test]
    fn test_undecodable_image_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let output = run_cli(&["analyze", path.to_str().unwrap()]);
        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("decode"));
    }

    #[test]
    fn test_missing_file_fails() {
        let output = run_cli(&["detect-grid", "/nonexistent/image.png"]);
        assert!(!output.status.success());
    }
}
