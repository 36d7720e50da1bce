//! Project profiles handed to the external UI test runners.
//!
//! The mobile runner (Appwright) takes a list of [`AppProject`]s; the
//! browser runner (Playwright) takes a [`BrowserSuite`]. Both are plain data
//! serialized in the runners' camelCase shape. The defaults mirror the
//! fixtures under `fixtures/`.

use crate::types::Target;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Android,
    Ios,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceProvider {
    Emulator,
    #[serde(rename = "local-device")]
    LocalDevice,
    Browserstack,
}

impl From<Target> for DeviceProvider {
    fn from(target: Target) -> Self {
        match target {
            Target::Emulator => DeviceProvider::Emulator,
            Target::Device => DeviceProvider::LocalDevice,
            Target::Browserstack => DeviceProvider::Browserstack,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSpec {
    pub provider: DeviceProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Never serialized, so configs can be logged and reported safely.
    #[serde(default, skip_serializing)]
    pub access_key: Option<String>,
}

impl DeviceSpec {
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.access_key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppProjectUse {
    pub platform: Platform,
    pub device: DeviceSpec,
    pub build_path: String,
    #[serde(default = "default_automation_name")]
    pub automation_name: String,
}

fn default_automation_name() -> String {
    "uiautomator2".to_string()
}

/// One device/platform project for the mobile runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppProject {
    pub name: String,
    #[serde(rename = "use")]
    pub use_: AppProjectUse,
}

impl AppProject {
    /// The Android project the Wikipedia fixtures are written against.
    pub fn wikipedia_android() -> Self {
        Self {
            name: "android".to_string(),
            use_: AppProjectUse {
                platform: Platform::Android,
                device: DeviceSpec {
                    provider: DeviceProvider::Browserstack,
                    name: Some("Google Pixel 7".to_string()),
                    os_version: Some("13.0".to_string()),
                    username: None,
                    access_key: None,
                },
                build_path: "builds/wikipedia.apk".to_string(),
                automation_name: default_automation_name(),
            },
        }
    }

    /// The iOS variant, shipped disabled in the fixture config.
    pub fn wikipedia_ios() -> Self {
        Self {
            name: "ios".to_string(),
            use_: AppProjectUse {
                platform: Platform::Ios,
                device: DeviceSpec {
                    provider: DeviceProvider::Browserstack,
                    name: Some("iPhone 14 Pro".to_string()),
                    os_version: Some("16".to_string()),
                    username: None,
                    access_key: None,
                },
                build_path: "builds/wikipedia_ios.zip".to_string(),
                automation_name: "xcuitest".to_string(),
            },
        }
    }

    /// Android project for a scheduler target. Local targets keep only the
    /// provider; BrowserStack keeps the cloud device name and OS version.
    pub fn for_target(name: &str, target: Target, build_path: impl Into<String>) -> Self {
        let mut project = Self::wikipedia_android();
        project.name = name.to_string();
        project.use_.build_path = build_path.into();
        if target != Target::Browserstack {
            project.use_.device = DeviceSpec {
                provider: target.into(),
                name: None,
                os_version: None,
                username: None,
                access_key: None,
            };
        }
        project
    }

    pub fn with_credentials(mut self, username: String, access_key: String) -> Self {
        self.use_.device.username = Some(username);
        self.use_.device.access_key = Some(access_key);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AndroidApp {
    pub package: String,
    pub activity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserProjectUse {
    pub browser_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub viewport: Viewport,
    pub device_scale_factor: f32,
    pub is_mobile: bool,
    pub has_touch: bool,
    #[serde(default)]
    pub launch_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AndroidApp>,
}

/// One browser/device emulation project for the browser runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserProject {
    pub name: String,
    #[serde(rename = "use")]
    pub use_: BrowserProjectUse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSuite {
    pub test_dir: String,
    pub timeout_ms: u64,
    pub expect_timeout_ms: u64,
    pub projects: Vec<BrowserProject>,
    pub reporter: String,
}

impl BrowserSuite {
    pub fn wikipedia() -> Self {
        Self {
            test_dir: "./tests".to_string(),
            timeout_ms: 30_000,
            expect_timeout_ms: 5_000,
            projects: vec![BrowserProject {
                name: "android".to_string(),
                use_: BrowserProjectUse {
                    browser_name: "chromium".to_string(),
                    channel: Some("chrome".to_string()),
                    viewport: Viewport {
                        width: 360,
                        height: 800,
                    },
                    device_scale_factor: 2.0,
                    is_mobile: true,
                    has_touch: true,
                    launch_args: vec!["--no-sandbox".to_string()],
                    app: Some(AndroidApp {
                        package: "org.wikipedia".to_string(),
                        activity: "org.wikipedia.main.MainActivity".to_string(),
                    }),
                },
            }],
            reporter: "list".to_string(),
        }
    }

    pub fn project(&self, name: &str) -> Option<&BrowserProject> {
        self.projects.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_project_shape() {
        let json = serde_json::to_value(AppProject::wikipedia_android()).unwrap();
        assert_eq!(json["name"], "android");
        assert_eq!(json["use"]["platform"], "ANDROID");
        assert_eq!(json["use"]["device"]["provider"], "browserstack");
        assert_eq!(json["use"]["device"]["osVersion"], "13.0");
        assert_eq!(json["use"]["buildPath"], "builds/wikipedia.apk");

        let ios = serde_json::to_value(AppProject::wikipedia_ios()).unwrap();
        assert_eq!(ios["use"]["platform"], "IOS");
        assert_eq!(ios["use"]["device"]["name"], "iPhone 14 Pro");
    }

    #[test]
    fn test_access_key_never_serialized() {
        let project = AppProject::wikipedia_android()
            .with_credentials("alice".to_string(), "s3cret".to_string());
        assert!(project.use_.device.has_credentials());
        let text = serde_json::to_string(&project).unwrap();
        assert!(text.contains("alice"));
        assert!(!text.contains("s3cret"));
    }

    #[test]
    fn test_local_targets_drop_cloud_device() {
        let project = AppProject::for_target("android", Target::Emulator, "apps/v1.apk");
        assert_eq!(project.use_.device.provider, DeviceProvider::Emulator);
        assert!(project.use_.device.name.is_none());
        assert_eq!(project.use_.build_path, "apps/v1.apk");

        let cloud = AppProject::for_target("android", Target::Browserstack, "builds/wikipedia.apk");
        assert_eq!(cloud.use_.device.name.as_deref(), Some("Google Pixel 7"));
    }

    #[test]
    fn test_browser_suite_defaults() {
        let suite = BrowserSuite::wikipedia();
        let android = suite.project("android").unwrap();
        assert_eq!(android.use_.viewport.width, 360);
        assert!(android.use_.is_mobile && android.use_.has_touch);
        assert_eq!(
            android.use_.app.as_ref().map(|a| a.package.as_str()),
            Some("org.wikipedia")
        );
        assert_eq!(suite.timeout_ms, 30_000);
        let json = serde_json::to_value(&suite).unwrap();
        assert_eq!(json["expectTimeoutMs"], 5000);
    }
}
