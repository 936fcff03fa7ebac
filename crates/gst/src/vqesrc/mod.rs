mod imp;

use gst::glib;
use gst::prelude::*;

glib::wrapper! {
    pub struct VqeSrc(ObjectSubclass<imp::VqeSrc>)
        @extends gst_base::PushSrc, gst_base::BaseSrc, gst::Element, gst::Object;
}

pub fn register(plugin: &gst::Plugin) -> Result<(), glib::BoolError> {
    gst::Element::register(
        Some(plugin),
        "vqesrc",
        gst::Rank::NONE,
        VqeSrc::static_type(),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Once;

    use super::*;

    fn init() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            gst::init().unwrap();
            crate::plugin_register_static().unwrap();
        });
    }

    #[test]
    fn counters_readable_across_start_and_stop() {
        init();
        let src = gst::ElementFactory::make("vqesrc")
            .property("sdp-or-uri", "rtp://127.0.0.1:31500")
            .build()
            .unwrap();

        src.set_state(gst::State::Paused).unwrap();
        let _: u64 = src.property("post-repair-outputs");

        src.set_state(gst::State::Null).unwrap();
        let _: u64 = src.property("post-repair-outputs");
        assert_eq!(src.property::<u64>("repair-rtcp-input"), 0);
    }
}
