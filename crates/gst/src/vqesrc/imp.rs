use std::path::PathBuf;
use std::sync::{Arc, LazyLock, OnceLock};

use gst::glib;
use gst::prelude::*;
use gst::subclass::prelude::*;
use gst_base::subclass::base_src::CreateSuccess;
use gst_base::subclass::prelude::*;
use parking_lot::Mutex;

use vqe::source::DEFAULT_RECEIVE_TIMEOUT;
use vqe::{Counter, SourceSession, SourceSettings, VqeError, WorkerCoordinator, stats};

static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "vqesrc",
        gst::DebugColorFlags::empty(),
        Some("VQE RTP Receiver"),
    )
});

#[derive(Debug, Clone, Default)]
struct Settings {
    sdp_or_uri: Option<String>,
    config_path: String,
}

pub struct VqeSrc {
    settings: Mutex<Settings>,
    session: Mutex<Option<Arc<SourceSession>>>,
}

impl Default for VqeSrc {
    fn default() -> Self {
        Self {
            settings: Mutex::new(Settings::default()),
            session: Mutex::new(None),
        }
    }
}

impl VqeSrc {
    /// Fresh value of one counter. Read failures post a warning and read 0.
    fn counter_value(&self, counter: Counter) -> u64 {
        let session = self.session.lock().clone();
        let result = match session {
            Some(session) => session.counter(counter),
            None => {
                let runtime = WorkerCoordinator::global().runtime().clone();
                stats::query(&runtime, None, counter)
            }
        };

        result.unwrap_or_else(|e| {
            gst::element_imp_warning!(
                self,
                gst::StreamError::Failed,
                ["Failed to get tuner stats: {}", e]
            );
            0
        })
    }
}

#[glib::object_subclass]
impl ObjectSubclass for VqeSrc {
    const NAME: &'static str = "GstVqeSrc";
    type Type = super::VqeSrc;
    type ParentType = gst_base::PushSrc;
}

impl ObjectImpl for VqeSrc {
    fn properties() -> &'static [glib::ParamSpec] {
        static PROPERTIES: OnceLock<Vec<glib::ParamSpec>> = OnceLock::new();
        PROPERTIES.get_or_init(|| {
            let mut props = vec![
                glib::ParamSpecString::builder("sdp-or-uri")
                    .nick("SDP or URI")
                    .blurb("SDP document or rtp:// / udp:// URI of the channel to tune to")
                    .build(),
                glib::ParamSpecString::builder("config-path")
                    .nick("Config Path")
                    .blurb("Runtime configuration file (empty for defaults)")
                    .default_value(Some(""))
                    .build(),
            ];
            props.extend(Counter::ALL.iter().map(|counter| {
                glib::ParamSpecUInt64::builder(counter.name())
                    .nick(counter.name())
                    .blurb(counter.blurb())
                    .read_only()
                    .build()
            }));
            props
        })
    }

    fn set_property(&self, _id: usize, value: &glib::Value, pspec: &glib::ParamSpec) {
        let mut settings = self.settings.lock();
        match pspec.name() {
            "sdp-or-uri" => {
                settings.sdp_or_uri = value.get().expect("type checked upstream");
                gst::debug!(CAT, imp = self, "sdp-or-uri set, applies on next start");
            }
            "config-path" => {
                settings.config_path = value
                    .get::<Option<String>>()
                    .expect("type checked upstream")
                    .unwrap_or_default();
            }
            _ => unimplemented!(),
        }
    }

    fn property(&self, _id: usize, pspec: &glib::ParamSpec) -> glib::Value {
        match pspec.name() {
            "sdp-or-uri" => self.settings.lock().sdp_or_uri.to_value(),
            "config-path" => self.settings.lock().config_path.to_value(),
            name => match Counter::from_name(name) {
                Some(counter) => self.counter_value(counter).to_value(),
                None => unimplemented!(),
            },
        }
    }

    fn constructed(&self) {
        self.parent_constructed();

        let obj = self.obj();
        obj.set_live(true);
        obj.set_format(gst::Format::Time);
        obj.set_do_timestamp(true);
    }
}

impl GstObjectImpl for VqeSrc {}

impl ElementImpl for VqeSrc {
    fn metadata() -> Option<&'static gst::subclass::ElementMetadata> {
        static ELEMENT_METADATA: OnceLock<gst::subclass::ElementMetadata> = OnceLock::new();
        Some(ELEMENT_METADATA.get_or_init(|| {
            gst::subclass::ElementMetadata::new(
                "RTP Receiver",
                "Source/Network",
                "Tune to multicast RTP streams",
                "gst-vqe contributors",
            )
        }))
    }

    fn pad_templates() -> &'static [gst::PadTemplate] {
        static PAD_TEMPLATES: OnceLock<Vec<gst::PadTemplate>> = OnceLock::new();
        PAD_TEMPLATES.get_or_init(|| {
            let caps = gst::Caps::new_empty_simple("video/mpegts");
            vec![
                gst::PadTemplate::new(
                    "src",
                    gst::PadDirection::Src,
                    gst::PadPresence::Always,
                    &caps,
                )
                .unwrap(),
            ]
        })
    }
}

impl BaseSrcImpl for VqeSrc {
    fn start(&self) -> Result<(), gst::ErrorMessage> {
        let settings = self.settings.lock().clone();
        let source = SourceSettings {
            sdp_or_uri: settings.sdp_or_uri.unwrap_or_default(),
            config_path: Some(settings.config_path)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            tuner_name: self.obj().path_string().to_string(),
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        };

        let session = SourceSession::start(&WorkerCoordinator::global(), &source).map_err(|e| {
            gst::error!(CAT, imp = self, "Failed to start: {}", e);
            crate::error_message(&e)
        })?;

        gst::info!(CAT, imp = self, "Tuned to {}", session.identity());
        *self.session.lock() = Some(Arc::new(session));
        Ok(())
    }

    fn stop(&self) -> Result<(), gst::ErrorMessage> {
        // Dropping the session may join the shared worker; do it unlocked.
        let session = self.session.lock().take();
        if let Some(session) = session {
            gst::info!(CAT, imp = self, "Stopping {}", session.identity());
            drop(session);
        }
        Ok(())
    }

    fn unlock(&self) -> Result<(), gst::ErrorMessage> {
        gst::log!(CAT, imp = self, "Flushing");
        let session = self.session.lock().clone();
        if let Some(session) = session {
            session.unlock();
        }
        Ok(())
    }

    fn unlock_stop(&self) -> Result<(), gst::ErrorMessage> {
        let session = self.session.lock().clone();
        if let Some(session) = session {
            session.unlock_stop().map_err(|e| {
                gst::error!(CAT, imp = self, "Failed to resume: {}", e);
                crate::error_message(&e)
            })?;
        }
        Ok(())
    }
}

impl PushSrcImpl for VqeSrc {
    fn create(
        &self,
        _buffer: Option<&mut gst::BufferRef>,
    ) -> Result<CreateSuccess, gst::FlowError> {
        let session = self.session.lock().clone().ok_or_else(|| {
            gst::element_imp_error!(self, gst::CoreError::Failed, ["Source not started"]);
            gst::FlowError::Error
        })?;

        match session.read_packet() {
            Ok(packet) => {
                gst::trace!(CAT, imp = self, "Received {} bytes", packet.len());
                Ok(CreateSuccess::NewBuffer(gst::Buffer::from_mut_slice(packet)))
            }
            Err(VqeError::Cancelled) => {
                gst::debug!(CAT, imp = self, "Receive cancelled");
                Err(gst::FlowError::Flushing)
            }
            Err(e @ VqeError::Alloc(_)) => {
                gst::element_imp_error!(self, gst::ResourceError::Failed, ["{}", e]);
                Err(gst::FlowError::Error)
            }
            Err(e) => {
                gst::element_imp_error!(
                    self,
                    gst::ResourceError::Read,
                    ["Error receiving data: {}", e]
                );
                Err(gst::FlowError::Error)
            }
        }
    }
}
