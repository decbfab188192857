//! Action dispatch: maps the planned action onto device operations.
//!
//! A step whose target cannot be resolved (no click point, no app match)
//! never crashes the loop; it either comes back as [`Dispatch::NoOp`]
//! (click/type, retried from the same state) or degrades to "no app
//! launched" (open-app) while the loop moves on.

use ab_glyph::FontVec;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::overlay;
use super::{Action, Dispatch, ResolvedTarget};
use crate::config::prompts;
use crate::device::{Device, DeviceError, Screenshot};
use crate::model::{Conversation, GatewayError, ModelService};
use crate::parser;
use crate::trajectory::NO_COORDINATE;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Borrowed view of the planned step handed to the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'a> {
    pub action: &'a Action,
    pub ground_truth: &'a str,
    pub target: Option<&'a ResolvedTarget>,
    /// Label drawn onto the target-box overlay (the run instruction).
    pub label: &'a str,
    pub step_index: usize,
}

/// Executes planned actions against a device.
pub struct ActionDispatcher {
    service: ModelService,
    overlay_dir: Option<PathBuf>,
    font: Option<FontVec>,
}

impl ActionDispatcher {
    pub fn new(service: ModelService) -> Self {
        Self {
            service,
            overlay_dir: None,
            font: None,
        }
    }

    /// Write click/target overlays into `dir`.
    pub fn with_overlay_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.overlay_dir = Some(dir.into());
        self
    }

    /// Load the overlay title font; label strips are skipped without it.
    pub fn with_overlay_font(mut self, path: &Path) -> Self {
        self.font = overlay::load_font(path);
        if self.font.is_none() {
            tracing::warn!(path = %path.display(), "overlay font not usable, labels disabled");
        }
        self
    }

    /// Execute one planned action. See [`Dispatch`] for the outcomes.
    pub async fn dispatch<D: Device>(
        &self,
        device: &mut D,
        request: &DispatchRequest<'_>,
        screen: &Screenshot,
    ) -> Result<Dispatch, DispatchError> {
        match request.action {
            Action::Stop => {
                tracing::info!("stop action, ending run");
                Ok(Dispatch::Stopped)
            }
            Action::Home => {
                device.home()?;
                Ok(advanced(None))
            }
            Action::Swipe(direction) => {
                let (x1, y1, x2, y2) = device.swipe(*direction)?;
                Ok(Dispatch::Advanced {
                    coordinates: [x1, y1, x2, y2],
                    typed: None,
                })
            }
            Action::OpenApp(name) => {
                self.resolve_and_launch(device, name).await?;
                Ok(advanced(None))
            }
            Action::Click => self.dispatch_click(device, request, screen).await,
            Action::Type => self.dispatch_type(device, request, screen).await,
            Action::None => Ok(advanced(None)),
        }
    }

    async fn dispatch_click<D: Device>(
        &self,
        device: &mut D,
        request: &DispatchRequest<'_>,
        screen: &Screenshot,
    ) -> Result<Dispatch, DispatchError> {
        let Some(target) = request.target else {
            tracing::debug!("click without resolved point, retrying step");
            return Ok(Dispatch::NoOp);
        };

        self.draw_overlays(screen, target, request.label, request.step_index);
        device.tap(target.point.0, target.point.1)?;

        // a tap that opens a keyboard expects immediate text entry
        let typed = if device.is_keyboard_open()? && !request.ground_truth.is_empty() {
            device.type_text(request.ground_truth)?;
            Some(request.ground_truth.to_string())
        } else {
            None
        };
        Ok(advanced(typed))
    }

    async fn dispatch_type<D: Device>(
        &self,
        device: &mut D,
        request: &DispatchRequest<'_>,
        screen: &Screenshot,
    ) -> Result<Dispatch, DispatchError> {
        if !device.is_keyboard_open()? {
            // click-to-focus first
            let Some(target) = request.target else {
                tracing::debug!("type without focus point, retrying step");
                return Ok(Dispatch::NoOp);
            };
            self.draw_overlays(screen, target, request.label, request.step_index);
            device.tap(target.point.0, target.point.1)?;
        }
        device.type_text(request.ground_truth)?;
        Ok(advanced(None))
    }

    /// App resolution failure degrades to "no app launched".
    async fn resolve_and_launch<D: Device>(
        &self,
        device: &mut D,
        app_name: &str,
    ) -> Result<(), DispatchError> {
        if app_name.is_empty() {
            tracing::warn!("open-app action without an app name");
            return Ok(());
        }

        let apps = device.installed_apps()?;
        let labels: Vec<String> = apps.iter().map(|app| app.label.clone()).collect();

        let mut chat = Conversation::default();
        chat.push_user(&prompts::relevant_app_prompt(app_name, &labels), &[]);
        let reply = self.service.chat(&chat).await?;

        let Some(resolved) = parser::labeled_field(&reply, "app") else {
            tracing::warn!(app_name, "app resolution reply had no app line");
            return Ok(());
        };
        let Some(app) = apps
            .iter()
            .find(|app| app.label.eq_ignore_ascii_case(resolved.trim()))
        else {
            tracing::warn!(app_name, resolved = %resolved, "resolved app not in catalog");
            return Ok(());
        };

        tracing::info!(label = %app.label, id = %app.id, "launching app");
        device.launch_app(&app.id)?;
        Ok(())
    }

    fn draw_overlays(
        &self,
        screen: &Screenshot,
        target: &ResolvedTarget,
        label: &str,
        step_index: usize,
    ) {
        let Some(dir) = &self.overlay_dir else {
            return;
        };
        let click_path = dir.join(format!("screenshot_{step_index}_click.png"));
        if let Err(e) = overlay::draw_click_marker(&screen.png, target.point, &click_path) {
            tracing::warn!(error = %e, "click overlay skipped");
        }
        if let Some(bbox) = target.bbox {
            let box_path = dir.join(format!("bbox_screenshot_{step_index}.png"));
            if let Err(e) =
                overlay::draw_target_box(&screen.png, bbox, Some(label), self.font.as_ref(), &box_path)
            {
                tracing::warn!(error = %e, "target-box overlay skipped");
            }
        }
    }
}

fn advanced(typed: Option<String>) -> Dispatch {
    Dispatch::Advanced {
        coordinates: [NO_COORDINATE; 4],
        typed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{InstalledApp, SwipeCoords, SwipeDirection};
    use crate::model::ServiceConfig;
    use tokio_util::sync::CancellationToken;

    /// Records every device-mutating call; probes are not recorded.
    struct TestDevice {
        calls: Vec<String>,
        keyboard_open: bool,
        keyboard_opens_on_tap: bool,
    }

    impl TestDevice {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                keyboard_open: false,
                keyboard_opens_on_tap: false,
            }
        }
    }

    impl Device for TestDevice {
        fn screenshot(&mut self) -> Result<Screenshot, DeviceError> {
            unimplemented!("dispatcher never captures")
        }

        fn screen_size(&mut self) -> Result<(u32, u32), DeviceError> {
            Ok((1080, 2000))
        }

        fn tap(&mut self, x: i32, y: i32) -> Result<(), DeviceError> {
            if self.keyboard_opens_on_tap {
                self.keyboard_open = true;
            }
            self.calls.push(format!("tap {x} {y}"));
            Ok(())
        }

        fn type_text(&mut self, text: &str) -> Result<(), DeviceError> {
            self.calls.push(format!("type {text}"));
            Ok(())
        }

        fn swipe(&mut self, direction: SwipeDirection) -> Result<SwipeCoords, DeviceError> {
            self.calls.push(format!("swipe {direction:?}"));
            Ok(crate::device::swipe_endpoints(direction, 1080, 2000))
        }

        fn home(&mut self) -> Result<(), DeviceError> {
            self.calls.push("home".to_string());
            Ok(())
        }

        fn is_keyboard_open(&mut self) -> Result<bool, DeviceError> {
            Ok(self.keyboard_open)
        }

        fn is_home_screen(&mut self) -> Result<bool, DeviceError> {
            Ok(false)
        }

        fn launch_app(&mut self, app_id: &str) -> Result<(), DeviceError> {
            self.calls.push(format!("launch {app_id}"));
            Ok(())
        }

        fn installed_apps(&mut self) -> Result<Vec<InstalledApp>, DeviceError> {
            Ok(Vec::new())
        }
    }

    fn dispatcher() -> ActionDispatcher {
        let service = ModelService::new(ServiceConfig::default(), CancellationToken::new());
        ActionDispatcher::new(service)
    }

    fn screenshot() -> Screenshot {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        Screenshot::from_png(buf.into_inner()).unwrap()
    }

    fn request<'a>(action: &'a Action, target: Option<&'a ResolvedTarget>) -> DispatchRequest<'a> {
        DispatchRequest {
            action,
            ground_truth: "hello",
            target,
            label: "test instruction",
            step_index: 0,
        }
    }

    #[tokio::test]
    async fn click_without_target_is_noop_with_zero_device_calls() {
        let mut device = TestDevice::new();
        let action = Action::Click;
        let outcome = dispatcher()
            .dispatch(&mut device, &request(&action, None), &screenshot())
            .await
            .unwrap();
        assert_eq!(outcome, Dispatch::NoOp);
        assert!(device.calls.is_empty());
    }

    #[tokio::test]
    async fn click_taps_and_types_when_keyboard_opens() {
        let mut device = TestDevice::new();
        device.keyboard_opens_on_tap = true;
        let action = Action::Click;
        let target = ResolvedTarget {
            point: (120, 640),
            bbox: None,
        };
        let outcome = dispatcher()
            .dispatch(&mut device, &request(&action, Some(&target)), &screenshot())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Dispatch::Advanced {
                coordinates: [NO_COORDINATE; 4],
                typed: Some("hello".to_string())
            }
        );
        assert_eq!(device.calls, vec!["tap 120 640", "type hello"]);
    }

    #[tokio::test]
    async fn click_without_keyboard_does_not_type() {
        let mut device = TestDevice::new();
        let action = Action::Click;
        let target = ResolvedTarget {
            point: (10, 20),
            bbox: None,
        };
        let outcome = dispatcher()
            .dispatch(&mut device, &request(&action, Some(&target)), &screenshot())
            .await
            .unwrap();
        assert_eq!(outcome, advanced(None));
        assert_eq!(device.calls, vec!["tap 10 20"]);
    }

    #[tokio::test]
    async fn type_with_keyboard_open_skips_the_focus_tap() {
        let mut device = TestDevice::new();
        device.keyboard_open = true;
        let action = Action::Type;
        let outcome = dispatcher()
            .dispatch(&mut device, &request(&action, None), &screenshot())
            .await
            .unwrap();
        assert_eq!(outcome, advanced(None));
        assert_eq!(device.calls, vec!["type hello"]);
    }

    #[tokio::test]
    async fn type_without_focus_point_is_noop() {
        let mut device = TestDevice::new();
        let action = Action::Type;
        let outcome = dispatcher()
            .dispatch(&mut device, &request(&action, None), &screenshot())
            .await
            .unwrap();
        assert_eq!(outcome, Dispatch::NoOp);
        assert!(device.calls.is_empty());
    }

    #[tokio::test]
    async fn type_clicks_to_focus_first() {
        let mut device = TestDevice::new();
        let action = Action::Type;
        let target = ResolvedTarget {
            point: (50, 60),
            bbox: None,
        };
        dispatcher()
            .dispatch(&mut device, &request(&action, Some(&target)), &screenshot())
            .await
            .unwrap();
        assert_eq!(device.calls, vec!["tap 50 60", "type hello"]);
    }

    #[tokio::test]
    async fn swipe_reports_gesture_endpoints() {
        let mut device = TestDevice::new();
        let action = Action::Swipe(SwipeDirection::BottomToUp);
        let outcome = dispatcher()
            .dispatch(&mut device, &request(&action, None), &screenshot())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Dispatch::Advanced {
                coordinates: [540, 250, 540, 1750],
                typed: None
            }
        );
    }

    #[tokio::test]
    async fn stop_is_terminal_and_touches_nothing() {
        let mut device = TestDevice::new();
        let action = Action::Stop;
        let outcome = dispatcher()
            .dispatch(&mut device, &request(&action, None), &screenshot())
            .await
            .unwrap();
        assert_eq!(outcome, Dispatch::Stopped);
        assert!(device.calls.is_empty());
    }

    #[tokio::test]
    async fn none_action_is_an_explicit_noop_step() {
        let mut device = TestDevice::new();
        let action = Action::None;
        let outcome = dispatcher()
            .dispatch(&mut device, &request(&action, None), &screenshot())
            .await
            .unwrap();
        assert_eq!(outcome, advanced(None));
        assert!(device.calls.is_empty());
    }

    #[tokio::test]
    async fn open_app_without_name_degrades_to_no_launch() {
        let mut device = TestDevice::new();
        let action = Action::OpenApp(String::new());
        let outcome = dispatcher()
            .dispatch(&mut device, &request(&action, None), &screenshot())
            .await
            .unwrap();
        assert_eq!(outcome, advanced(None));
        assert!(device.calls.is_empty());
    }
}
