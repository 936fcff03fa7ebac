mod imp;

use gst::glib;
use gst::prelude::*;

glib::wrapper! {
    pub struct VqeSdpDemux(ObjectSubclass<imp::VqeSdpDemux>)
        @extends gst::Bin, gst::Element, gst::Object,
        @implements gst::ChildProxy;
}

pub fn register(plugin: &gst::Plugin) -> Result<(), glib::BoolError> {
    gst::Element::register(
        Some(plugin),
        "vqesdpdemux",
        gst::Rank::PRIMARY,
        VqeSdpDemux::static_type(),
    )
}
