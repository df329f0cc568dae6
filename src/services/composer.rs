use anyhow::{Context, Result};
use image::DynamicImage;
use image::GenericImageView;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfLayerReference, Rect, Rgb,
};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::services::sanitizer::SanitizedAsset;

// Business-card-like ticket, printed without margins.
const PAGE_WIDTH_MM: f32 = 90.0;
const PAGE_HEIGHT_MM: f32 = 55.0;

// All ticket text is literal content, never user-supplied.
const PHONE_LINE: &str = "Tel. 900 123 456";
const GIFT_LABEL: &str = "VALE REGALO";
const PRICE_LINE: &str = "9,99 EUR";
const SITE_LINE: &str = "www.ticketera.example";
const PLACEHOLDER_LINE_1: &str = "Espacio reservado";
const PLACEHOLDER_LINE_2: &str = "para el codigo de barras";

// Logo slot at the top of the ticket.
const LOGO_X_MM: f32 = 6.0;
const LOGO_TOP_MM: f32 = 52.0;
const LOGO_WIDTH_MM: f32 = 32.0;

// Barcode slot on the lower right.
const SLOT_LEFT_MM: f32 = 50.0;
const SLOT_RIGHT_MM: f32 = 86.0;
const SLOT_BOTTOM_MM: f32 = 8.0;
const SLOT_TOP_MM: f32 = 26.0;

// Watermark is stamped at a fixed coordinate on every variant.
const WATERMARK_X_MM: f32 = 80.0;
const WATERMARK_TOP_MM: f32 = 52.0;
const WATERMARK_WIDTH_MM: f32 = 7.0;

/// Everything a single ticket render needs, assembled from request
/// state and consumed once.
pub struct TicketSpec {
    pub logo: Option<SanitizedAsset>,
    pub barcode: Option<SanitizedAsset>,
    pub with_barcode: bool,
}

impl TicketSpec {
    /// The download filename varies only by the barcode flag.
    pub fn download_filename(&self) -> &'static str {
        if self.with_barcode {
            "ticket-con-codigo.pdf"
        } else {
            "ticket-sin-codigo.pdf"
        }
    }
}

pub struct TicketComposer {
    watermark_path: PathBuf,
}

impl TicketComposer {
    pub fn new(watermark_path: PathBuf) -> Self {
        Self { watermark_path }
    }

    /// Lay out the fixed-geometry ticket and return the finished PDF as
    /// an in-memory byte stream. Nothing is written server-side.
    ///
    /// Missing or unreadable image files are non-fatal at this stage:
    /// the slot is left blank and the condition is logged.
    pub fn compose(&self, spec: &TicketSpec) -> Result<Vec<u8>> {
        let (doc, page, layer) = PdfDocument::new(
            "Ticket regalo",
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            "Layer 1",
        );
        let layer = doc.get_page(page).get_layer(layer);

        let helvetica = doc.add_builtin_font(BuiltinFont::Helvetica)?;
        let helvetica_bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;
        let helvetica_oblique = doc.add_builtin_font(BuiltinFont::HelveticaOblique)?;

        if let Some(logo) = &spec.logo {
            self.draw_image_slot(&layer, &logo.path, LOGO_X_MM, LOGO_TOP_MM, LOGO_WIDTH_MM, "logo");
        }

        self.draw_phone_band(&layer, &helvetica_bold);

        // Amber gift label over a bold price line.
        layer.set_fill_color(Color::Rgb(Rgb::new(0.95, 0.62, 0.05, None)));
        layer.use_text(GIFT_LABEL, 9.0, Mm(6.0), Mm(22.0), &helvetica_bold);

        layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
        layer.use_text(PRICE_LINE, 15.0, Mm(6.0), Mm(13.0), &helvetica_bold);

        layer.use_text(SITE_LINE, 7.0, Mm(6.0), Mm(4.0), &helvetica);

        match (&spec.barcode, spec.with_barcode) {
            (Some(barcode), true) => {
                // The logo is intentionally drawn a second time at the
                // secondary position, with the barcode beneath it.
                if let Some(logo) = &spec.logo {
                    self.draw_image_slot(
                        &layer,
                        &logo.path,
                        SLOT_LEFT_MM + 2.0,
                        SLOT_TOP_MM,
                        18.0,
                        "logo",
                    );
                }
                self.draw_image_slot(
                    &layer,
                    &barcode.path,
                    SLOT_LEFT_MM + 2.0,
                    SLOT_TOP_MM - 9.0,
                    32.0,
                    "barcode",
                );
            }
            _ => self.draw_barcode_placeholder(&layer, &helvetica_oblique),
        }

        self.draw_image_slot(
            &layer,
            &self.watermark_path,
            WATERMARK_X_MM,
            WATERMARK_TOP_MM,
            WATERMARK_WIDTH_MM,
            "watermark",
        );

        doc.save_to_bytes().context("failed to serialize ticket PDF")
    }

    /// Black filled band with the phone number in white.
    fn draw_phone_band(&self, layer: &PdfLayerReference, font: &IndirectFontRef) {
        layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
        let band = Rect::new(Mm(0.0), Mm(28.0), Mm(PAGE_WIDTH_MM), Mm(34.5))
            .with_mode(PaintMode::Fill);
        layer.add_rect(band);

        layer.set_fill_color(Color::Rgb(Rgb::new(1.0, 1.0, 1.0, None)));
        layer.use_text(PHONE_LINE, 11.0, Mm(6.0), Mm(30.0), font);
    }

    /// Bordered box with italic reserved-space text, rendered whenever
    /// the barcode variant is off or the barcode never made it through
    /// sanitization.
    fn draw_barcode_placeholder(&self, layer: &PdfLayerReference, font: &IndirectFontRef) {
        layer.set_outline_color(Color::Rgb(Rgb::new(0.3, 0.3, 0.3, None)));
        layer.set_outline_thickness(0.6);
        let frame = Rect::new(
            Mm(SLOT_LEFT_MM),
            Mm(SLOT_BOTTOM_MM),
            Mm(SLOT_RIGHT_MM),
            Mm(SLOT_TOP_MM),
        )
        .with_mode(PaintMode::Stroke);
        layer.add_rect(frame);

        layer.set_fill_color(Color::Rgb(Rgb::new(0.3, 0.3, 0.3, None)));
        layer.use_text(PLACEHOLDER_LINE_1, 7.0, Mm(SLOT_LEFT_MM + 3.0), Mm(18.5), font);
        layer.use_text(PLACEHOLDER_LINE_2, 7.0, Mm(SLOT_LEFT_MM + 3.0), Mm(14.5), font);
    }

    /// Embed an image file at a fixed position, scaled to a fixed width.
    /// Unreadable files leave the slot blank; the ticket is still emitted.
    fn draw_image_slot(
        &self,
        layer: &PdfLayerReference,
        path: &Path,
        x_mm: f32,
        top_mm: f32,
        width_mm: f32,
        slot: &str,
    ) {
        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                warn!(
                    slot,
                    "Could not read {} for composition, leaving slot blank: {}",
                    path.display(),
                    e
                );
                return;
            }
        };

        place_image(layer, img, x_mm, top_mm, width_mm);
    }
}

/// Place a decoded image with its top-left corner at (`x_mm`, `top_mm`),
/// scaled to `width_mm` with the aspect ratio preserved.
fn place_image(
    layer: &PdfLayerReference,
    img: DynamicImage,
    x_mm: f32,
    top_mm: f32,
    width_mm: f32,
) {
    let (w_px, h_px) = img.dimensions();
    if w_px == 0 || h_px == 0 {
        return;
    }

    // printpdf sizes embedded images through their DPI.
    let dpi = w_px as f32 * 25.4 / width_mm;
    let height_mm = h_px as f32 * 25.4 / dpi;

    // The embedder expects plain 8-bit RGB samples.
    let pdf_image = Image::from_dynamic_image(&DynamicImage::ImageRgb8(img.to_rgb8()));
    pdf_image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(x_mm)),
            translate_y: Some(Mm(top_mm - height_mm)),
            dpi: Some(dpi),
            ..Default::default()
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_sample_png(dir: &Path, name: &str) -> SanitizedAsset {
        let img = image::RgbImage::from_fn(20, 10, |x, y| {
            image::Rgb([(x * 12) as u8, (y * 25) as u8, 200])
        });
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Png)
            .unwrap();
        let path = dir.join(name);
        std::fs::write(&path, &buf).unwrap();
        SanitizedAsset {
            path,
            size: buf.len() as u64,
        }
    }

    #[test]
    fn test_download_filename_variants() {
        let with = TicketSpec {
            logo: None,
            barcode: None,
            with_barcode: true,
        };
        let without = TicketSpec {
            logo: None,
            barcode: None,
            with_barcode: false,
        };
        assert_eq!(with.download_filename(), "ticket-con-codigo.pdf");
        assert_eq!(without.download_filename(), "ticket-sin-codigo.pdf");
    }

    #[test]
    fn test_compose_without_any_assets_emits_pdf() {
        let composer = TicketComposer::new(PathBuf::from("does/not/exist.png"));
        let spec = TicketSpec {
            logo: None,
            barcode: None,
            with_barcode: false,
        };

        let bytes = composer.compose(&spec).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_compose_with_both_images() {
        let tmp = tempfile::tempdir().unwrap();
        let logo = write_sample_png(tmp.path(), "logo.png");
        let barcode = write_sample_png(tmp.path(), "barcode.png");

        let composer = TicketComposer::new(PathBuf::from("assets/watermark.png"));
        let spec = TicketSpec {
            logo: Some(logo),
            barcode: Some(barcode),
            with_barcode: true,
        };

        let bytes = composer.compose(&spec).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        // Two logo draws plus the barcode leave more content than the
        // placeholder variant.
        let placeholder = composer
            .compose(&TicketSpec {
                logo: None,
                barcode: None,
                with_barcode: true,
            })
            .unwrap();
        assert!(bytes.len() > placeholder.len());
    }

    #[test]
    fn test_unreadable_logo_is_non_fatal() {
        let composer = TicketComposer::new(PathBuf::from("does/not/exist.png"));
        let spec = TicketSpec {
            logo: Some(SanitizedAsset {
                path: PathBuf::from("gone/by/now.png"),
                size: 0,
            }),
            barcode: None,
            with_barcode: false,
        };

        assert!(composer.compose(&spec).is_ok());
    }
}
