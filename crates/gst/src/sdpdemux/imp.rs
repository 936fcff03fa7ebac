use std::sync::{LazyLock, OnceLock};

use gst::glib;
use gst::prelude::*;
use gst::subclass::prelude::*;
use parking_lot::Mutex;

use vqe::demux::{ChainOutcome, EosOutcome};
use vqe::{ContainerHost, SdpDemux, SourceRegistry, VqeError};

use crate::vqesrc::VqeSrc;

static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "vqesdpdemux",
        gst::DebugColorFlags::empty(),
        Some("VQE SDP Demux"),
    )
});

const CHILD_SOURCE: &str = "vqesrc";

static SOURCES: LazyLock<SourceRegistry<gst::Element>> = LazyLock::new(|| {
    let mut registry = SourceRegistry::new();
    registry.register(CHILD_SOURCE, |sdp: &str| {
        Ok(glib::Object::builder::<VqeSrc>()
            .property("sdp-or-uri", sdp)
            .build()
            .upcast::<gst::Element>())
    });
    registry
});

/// The instantiated source and the ghost pad exposing its output.
pub struct Child {
    element: gst::Element,
    srcpad: gst::GhostPad,
}

pub struct VqeSdpDemux {
    sinkpad: gst::Pad,
    demux: Mutex<SdpDemux<Child>>,
}

impl VqeSdpDemux {
    fn sink_chain(
        &self,
        _pad: &gst::Pad,
        buffer: gst::Buffer,
    ) -> Result<gst::FlowSuccess, gst::FlowError> {
        let map = buffer.map_readable().map_err(|_| {
            gst::error!(CAT, imp = self, "Failed to map buffer readable");
            gst::FlowError::Error
        })?;

        match self.demux.lock().chain(map.as_slice()) {
            ChainOutcome::Accepted => {
                gst::log!(CAT, imp = self, "Buffered {} bytes of SDP", map.size());
                Ok(gst::FlowSuccess::Ok)
            }
            ChainOutcome::EndOfStream => Err(gst::FlowError::Eos),
        }
    }

    fn sink_event(&self, pad: &gst::Pad, event: gst::Event) -> bool {
        use gst::EventView;

        gst::log!(CAT, obj = pad, "Handling event {:?}", event);
        match event.view() {
            EventView::Eos(_) => {
                self.end_of_input();
                true
            }
            // The child source produces its own segment.
            EventView::Segment(_) => true,
            _ => gst::Pad::event_default(pad, Some(&*self.obj()), event),
        }
    }

    fn end_of_input(&self) {
        let mut demux = self.demux.lock();
        match demux.end_of_input(self) {
            Ok(EosOutcome::Instantiated) => {
                gst::info!(CAT, imp = self, "Instantiated {}", CHILD_SOURCE);
            }
            Ok(EosOutcome::NoDocument) => {
                gst::debug!(CAT, imp = self, "No source to instantiate");
            }
            Ok(EosOutcome::AlreadyComplete) => {
                gst::debug!(CAT, imp = self, "Ignoring repeated EOS");
            }
            Err(e) => {
                gst::error!(CAT, imp = self, "Failed to instantiate source: {}", e);
                self.post_error_message(crate::error_message(&e));
            }
        }
    }

    fn reset(&self) {
        gst::debug!(CAT, imp = self, "Resetting");
        self.demux.lock().reset(self);
    }
}

fn host_error(what: &str, err: impl std::fmt::Display) -> VqeError {
    VqeError::Host(format!("{what}: {err}"))
}

impl ContainerHost for VqeSdpDemux {
    type Child = Child;

    fn create_child(&self, sdp: &str) -> vqe::Result<Child> {
        let element = SOURCES.create(CHILD_SOURCE, sdp)?;
        let templ = self
            .obj()
            .pad_template("src")
            .ok_or_else(|| VqeError::Host("missing src pad template".into()))?;
        let srcpad = gst::GhostPad::builder_from_template(&templ)
            .name("src")
            .build();
        Ok(Child { element, srcpad })
    }

    fn adopt_child(&self, child: &Child) -> vqe::Result<()> {
        self.obj()
            .add(&child.element)
            .map_err(|e| host_error("failed to add source to bin", e))
    }

    fn expose_output(&self, child: &Child) -> vqe::Result<()> {
        let target = child
            .element
            .static_pad("src")
            .ok_or_else(|| VqeError::Host("source has no src pad".into()))?;
        child
            .srcpad
            .set_target(Some(&target))
            .map_err(|e| host_error("failed to target ghost pad", e))?;
        child
            .srcpad
            .set_active(true)
            .map_err(|e| host_error("failed to activate ghost pad", e))?;

        let obj = self.obj();
        obj.add_pad(&child.srcpad)
            .map_err(|e| host_error("failed to add src pad", e))?;
        obj.no_more_pads();
        gst::debug!(CAT, imp = self, "Exposed {}", child.srcpad.name());
        Ok(())
    }

    fn sync_child_state(&self, child: &Child) -> vqe::Result<()> {
        child
            .element
            .sync_state_with_parent()
            .map_err(|e| host_error("failed to sync source state", e))
    }

    fn play_child(&self, child: &Child) -> vqe::Result<()> {
        child
            .element
            .set_state(gst::State::Playing)
            .map(|_| ())
            .map_err(|e| host_error("failed to start source", e))
    }

    fn discard_child(&self, child: Child) {
        let obj = self.obj();
        if child.srcpad.has_as_parent(&*obj) {
            let _ = child.srcpad.set_active(false);
            if let Err(e) = obj.remove_pad(&child.srcpad) {
                gst::warning!(CAT, imp = self, "Failed to remove src pad: {}", e);
            }
        }
        let _ = child.element.set_state(gst::State::Null);
        if child.element.has_as_parent(&*obj) {
            if let Err(e) = obj.remove(&child.element) {
                gst::warning!(CAT, imp = self, "Failed to remove source: {}", e);
            }
        }
    }

    fn report_error(&self, error: &VqeError) {
        gst::element_imp_error!(self, gst::StreamError::Failed, ["{}", error]);
    }

    fn report_warning(&self, message: &str) {
        gst::element_imp_warning!(self, gst::StreamError::Demux, ["{}", message]);
    }
}

#[glib::object_subclass]
impl ObjectSubclass for VqeSdpDemux {
    const NAME: &'static str = "GstVqeSdpDemux";
    type Type = super::VqeSdpDemux;
    type ParentType = gst::Bin;

    fn with_class(klass: &Self::Class) -> Self {
        let templ = klass.pad_template("sink").unwrap();
        let sinkpad = gst::Pad::builder_from_template(&templ)
            .chain_function(|pad, parent, buffer| {
                VqeSdpDemux::catch_panic_pad_function(
                    parent,
                    || Err(gst::FlowError::Error),
                    |this| this.sink_chain(pad, buffer),
                )
            })
            .event_function(|pad, parent, event| {
                VqeSdpDemux::catch_panic_pad_function(
                    parent,
                    || false,
                    |this| this.sink_event(pad, event),
                )
            })
            .build();

        Self {
            sinkpad,
            demux: Mutex::new(SdpDemux::new()),
        }
    }
}

impl ObjectImpl for VqeSdpDemux {
    fn constructed(&self) {
        self.parent_constructed();
        self.obj().add_pad(&self.sinkpad).unwrap();
    }
}

impl GstObjectImpl for VqeSdpDemux {}

impl ElementImpl for VqeSdpDemux {
    fn metadata() -> Option<&'static gst::subclass::ElementMetadata> {
        static ELEMENT_METADATA: OnceLock<gst::subclass::ElementMetadata> = OnceLock::new();
        Some(ELEMENT_METADATA.get_or_init(|| {
            gst::subclass::ElementMetadata::new(
                "VQE SDP Demux",
                "Demuxer/URIList",
                "Receive the RTP feed described by an SDP document",
                "gst-vqe contributors",
            )
        }))
    }

    fn pad_templates() -> &'static [gst::PadTemplate] {
        static PAD_TEMPLATES: OnceLock<Vec<gst::PadTemplate>> = OnceLock::new();
        PAD_TEMPLATES.get_or_init(|| {
            vec![
                gst::PadTemplate::new(
                    "sink",
                    gst::PadDirection::Sink,
                    gst::PadPresence::Always,
                    &gst::Caps::new_empty_simple("application/sdp"),
                )
                .unwrap(),
                gst::PadTemplate::new(
                    "src",
                    gst::PadDirection::Src,
                    gst::PadPresence::Sometimes,
                    &gst::Caps::new_empty_simple("video/mpegts"),
                )
                .unwrap(),
            ]
        })
    }

    fn change_state(
        &self,
        transition: gst::StateChange,
    ) -> Result<gst::StateChangeSuccess, gst::StateChangeError> {
        if transition == gst::StateChange::ReadyToPaused {
            self.reset();
        }

        let mut success = self.parent_change_state(transition)?;

        match transition {
            gst::StateChange::ReadyToPaused => {
                success = gst::StateChangeSuccess::NoPreroll;
            }
            gst::StateChange::PausedToReady => self.reset(),
            _ => (),
        }

        Ok(success)
    }
}

impl BinImpl for VqeSdpDemux {}
