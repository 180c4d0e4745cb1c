//! EPUB engine and viewer tests against a real archive

use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use shelf_reader::{
    Book, EpubEngine, EpubViewer, Location, PageSurface, ReaderError, RenderEngine, Rendition,
    SharedSurface, Theme,
};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTAINER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const PACKAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Dune</dc:title>
    <dc:creator>Frank Herbert</dc:creator>
    <dc:identifier id="bookid">urn:uuid:shelf-dune</dc:identifier>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="cover" href="cover.png" media-type="image/png"/>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="ch2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="cover"/>
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
</package>"#;

const NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="urn:uuid:shelf-dune"/></head>
  <docTitle><text>Dune</text></docTitle>
  <navMap>
    <navPoint id="n1" playOrder="1"><navLabel><text>Arrakis</text></navLabel><content src="ch1.xhtml"/></navPoint>
    <navPoint id="n2" playOrder="2"><navLabel><text>Muad'Dib</text></navLabel><content src="ch2.xhtml"/></navPoint>
  </navMap>
</ncx>"#;

fn chapter(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>{title}</title></head><body><p>{body}</p></body></html>"#
    )
}

/// Cover image first, then two chapters
fn dune_epub() -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut add = |name: &str, bytes: &[u8]| {
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file(name, stored).unwrap();
        zip.write_all(bytes).unwrap();
    };
    add("mimetype", b"application/epub+zip");
    add("META-INF/container.xml", CONTAINER.as_bytes());
    add("OEBPS/content.opf", PACKAGE.as_bytes());
    add("OEBPS/toc.ncx", NCX.as_bytes());
    add("OEBPS/cover.png", &[0x89, b'P', b'N', b'G', 0xff, 0xfe, 0x00, 0xc3]);
    add("OEBPS/ch1.xhtml", chapter("Cover", "A beginning is a very delicate time.").as_bytes());
    add("OEBPS/ch2.xhtml", chapter("Chapter 2", "The spice must flow.").as_bytes());

    zip.finish().unwrap().into_inner()
}

fn page_surface() -> (Arc<Mutex<PageSurface>>, SharedSurface) {
    let surface = Arc::new(Mutex::new(PageSurface::new()));
    let shared: SharedSurface = surface.clone();
    (surface, shared)
}

#[test]
fn test_metadata_title_comes_from_package() {
    let book = EpubEngine::new().open(dune_epub()).unwrap();

    assert_eq!(book.metadata().title.as_deref(), Some("Dune"));
    assert_eq!(book.metadata().sections, 3);
}

#[test]
fn test_rendition_walks_spine_and_stops_at_both_ends() {
    let (surface, shared) = page_surface();
    let mut book = EpubEngine::new().open(dune_epub()).unwrap();
    let mut rendition = book.render_to(shared).unwrap();
    for theme in Theme::ALL {
        rendition.register_theme(theme, theme.colors());
    }

    // cover image has no markup and is skipped
    let first = rendition.display_first().unwrap();
    assert_eq!(first, Location { index: 1, total: 3 });
    assert!(surface.lock().unwrap().page().unwrap().content.contains("delicate time"));

    let last = rendition.next().unwrap().unwrap();
    assert_eq!(last.index, 2);
    assert!(last.is_last());
    assert!(surface.lock().unwrap().page().unwrap().content.contains("spice must flow"));
    assert_eq!(rendition.next().unwrap(), None);

    assert_eq!(rendition.prev().unwrap().map(|l| l.index), Some(1));
    assert_eq!(rendition.prev().unwrap().map(|l| l.index), Some(0));
    assert_eq!(rendition.prev().unwrap(), None);
    assert_eq!(rendition.location().map(|l| l.index), Some(0));

    rendition.destroy();
    book.destroy();
    assert!(matches!(rendition.next(), Err(ReaderError::Destroyed)));
    assert!(matches!(
        rendition.select_theme(Theme::Dark),
        Err(ReaderError::Destroyed)
    ));
}

#[test]
fn test_viewer_load_navigate_theme_and_drop() {
    let (surface, shared) = page_surface();
    let mut viewer = EpubViewer::new(EpubEngine::new(), shared);

    let mut ready = None;
    viewer
        .load(dune_epub(), Theme::Light, |navigator, metadata| {
            ready = Some((navigator, metadata.clone()));
        })
        .unwrap();
    let (navigator, metadata) = ready.unwrap();
    assert_eq!(metadata.title.as_deref(), Some("Dune"));
    assert!(surface.lock().unwrap().is_mounted());

    assert_eq!(navigator.next().unwrap().map(|l| l.index), Some(2));
    assert_eq!(navigator.prev().unwrap().map(|l| l.index), Some(1));

    let paints = surface.lock().unwrap().paint_count();
    viewer.set_theme(Theme::Sepia).unwrap();
    {
        let surface = surface.lock().unwrap();
        assert_eq!(surface.paint_count(), paints + 1);
        let page = surface.page().unwrap();
        assert_eq!(page.colors, Theme::Sepia.colors());
        assert_eq!(page.location.index, 1);
    }

    drop(viewer);

    assert!(!navigator.is_alive());
    assert!(matches!(navigator.next(), Err(ReaderError::Destroyed)));
    let surface = surface.lock().unwrap();
    assert!(!surface.is_mounted());
    assert!(surface.page().is_none());
}
