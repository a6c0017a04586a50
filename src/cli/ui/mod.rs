mod device_view;
mod painter;
mod spinner;
mod stream_view;
mod table;
mod writer;

pub(crate) use self::device_view::PeripheralView;
pub(crate) use self::painter::Painter;
pub(crate) use self::spinner::Spinner;
pub(crate) use self::writer::UpdateWriter;
