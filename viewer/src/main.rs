mod cubes;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use kestrel_gal::ash::vk;
use kestrel_gal::core::{Instance, InstanceCreateInfo};
use kestrel_gal::device::{ContextConfig, DeviceContext};
use kestrel_gal::raw_window_handle::HasDisplayHandle;
use kestrel_gal::winit;
use kestrel_gal::wsi::Surface;
use kestrel_render::{
    FrameScheduler, RenderError, SchedulerConfig, VulkanPresentBackend,
};

/// Presents a cleared swapchain every frame and, on ray tracing capable devices, keeps a grid of
/// cubes' acceleration structures refitted underneath it
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
struct Options {
    /// Exit after presenting this many frames
    #[arg(long)]
    frames: Option<u64>,
    /// Present as fast as possible instead of waiting for vertical blank
    #[arg(long)]
    no_vsync: bool,
    /// Enable the Khronos validation layer if installed
    #[arg(long)]
    validation: bool,
    /// Number of cubes placed in the acceleration structure
    #[arg(long, default_value_t = 64)]
    objects: usize,
    /// Frames kept in flight
    #[arg(long, default_value_t = 2)]
    frames_in_flight: usize,
    #[arg(long)]
    verbose: bool,
}

struct Viewer {
    // drop order matters: structures, then swapchain and surface, then the device
    cubes: Option<cubes::Cubes>,
    scheduler: FrameScheduler<VulkanPresentBackend>,
    _context: Arc<DeviceContext>,
    started: Instant,
    frames_presented: u64,
}

impl Viewer {
    fn new(window: &winit::window::Window, options: &Options) -> Result<Self> {
        let config = ContextConfig {
            application_name: String::from("kestrel viewer"),
            enable_validation: options.validation,
            require_ray_tracing: false,
        };
        let instance = Instance::new(InstanceCreateInfo {
            application_name: &config.application_name,
            display_handle: window.display_handle()?.as_raw(),
            enable_validation: config.enable_validation,
        })?;
        let surface = Surface::new(&instance, window)?;
        let context = Arc::new(DeviceContext::new(instance, &surface, &config)?);

        let size = window.inner_size();
        let scheduler = FrameScheduler::new(
            VulkanPresentBackend::new(surface, context.clone()),
            SchedulerConfig {
                frames_in_flight: options.frames_in_flight,
                vsync: !options.no_vsync,
                ..Default::default()
            },
            Some(vk::Extent2D {
                width: size.width,
                height: size.height,
            }),
        )?;

        let cubes = if !context.supports_ray_tracing() {
            tracing::warn!("Device has no acceleration structure support, only presenting");
            None
        } else if options.objects == 0 {
            None
        } else {
            Some(cubes::Cubes::new(&context, options.objects)?)
        };

        Ok(Self {
            cubes,
            scheduler,
            _context: context,
            started: Instant::now(),
            frames_presented: 0,
        })
    }

    fn redraw(&mut self) -> Result<()> {
        let seconds = self.started.elapsed().as_secs_f32();
        // refit drains the device first, so no frame is still reading the old structure
        if let Some(cubes) = self.cubes.as_mut() {
            cubes.animate(seconds)?;
        }

        let mut target = match self.scheduler.acquire_frame() {
            Ok(target) => target,
            Err(error)
                if error
                    .downcast_ref::<RenderError>()
                    .is_some_and(RenderError::is_transient) =>
            {
                return Ok(());
            }
            Err(error) => return Err(error),
        };
        if self.scheduler.is_stale() {
            tracing::debug!(
                "Presenting at {}x{} from now on",
                target.extent.width,
                target.extent.height
            );
        }
        target.command.clear([
            0.5 + 0.5 * seconds.sin(),
            0.2,
            0.5 + 0.5 * seconds.cos(),
            1.0,
        ]);
        self.scheduler.submit_and_present(target)?;
        self.frames_presented += 1;
        Ok(())
    }
}

struct App {
    options: Options,
    // the viewer has to go before the window its surface was made for
    viewer: Option<Viewer>,
    window: Option<winit::window::Window>,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(options: Options) -> Self {
        Self {
            options,
            viewer: None,
            window: None,
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &winit::event_loop::ActiveEventLoop, error: anyhow::Error) {
        tracing::error!("{:#}", error);
        self.viewer = None;
        self.error = Some(error);
        event_loop.exit();
    }
}

impl winit::application::ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        if self.window.is_none() {
            match event_loop.create_window(
                winit::window::WindowAttributes::default()
                    .with_title("kestrel")
                    .with_resizable(true),
            ) {
                Ok(window) => self.window = Some(window),
                Err(error) => return self.fail(event_loop, error.into()),
            }
        }
        if self.viewer.is_none() {
            let Some(window) = self.window.as_ref() else {
                return;
            };
            match Viewer::new(window, &self.options) {
                Ok(viewer) => self.viewer = Some(viewer),
                Err(error) => self.fail(event_loop, error),
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &winit::event_loop::ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: winit::event::WindowEvent,
    ) {
        match event {
            winit::event::WindowEvent::CloseRequested => {
                // waits for the device before anything is released
                self.viewer = None;
                event_loop.exit();
            }
            winit::event::WindowEvent::Resized(size) => {
                if let Some(viewer) = self.viewer.as_mut() {
                    viewer.scheduler.set_window_extent(vk::Extent2D {
                        width: size.width,
                        height: size.height,
                    });
                }
            }
            winit::event::WindowEvent::RedrawRequested => {
                let Some(viewer) = self.viewer.as_mut() else {
                    return;
                };
                if let Err(error) = viewer.redraw() {
                    return self.fail(event_loop, error);
                }
                if self
                    .options
                    .frames
                    .is_some_and(|frames| viewer.frames_presented >= frames)
                {
                    tracing::info!(
                        "Presented {} frames in {:.2}s",
                        viewer.frames_presented,
                        viewer.started.elapsed().as_secs_f32()
                    );
                    self.viewer = None;
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let options = Options::parse();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if options.verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let event_loop = winit::event_loop::EventLoop::new()?;
    event_loop.set_control_flow(winit::event_loop::ControlFlow::Poll);
    let mut app = App::new(options);
    event_loop.run_app(&mut app)?;
    match app.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::try_parse_from(["kestrel_viewer"]).unwrap();
        assert_eq!(options.frames, None);
        assert!(!options.no_vsync);
        assert_eq!(options.objects, 64);
        assert_eq!(options.frames_in_flight, 2);
    }

    #[test]
    fn test_flags() {
        let options = Options::try_parse_from([
            "kestrel_viewer",
            "--frames",
            "120",
            "--no-vsync",
            "--objects",
            "300",
            "--frames-in-flight",
            "3",
            "--validation",
        ])
        .unwrap();
        assert_eq!(options.frames, Some(120));
        assert!(options.no_vsync);
        assert!(options.validation);
        assert_eq!(options.objects, 300);
        assert_eq!(options.frames_in_flight, 3);
        assert!(Options::try_parse_from(["kestrel_viewer", "--objects", "many"]).is_err());
    }
}
