//! Diff-and-apply programming engine
//!
//! Flash and EEPROM writes go through a diff against the current device
//! content so that only changed pages or bytes are transferred, and every
//! write is verified by reading it back. A verification mismatch aborts the
//! whole run immediately; the device is left partially programmed rather than
//! silently retried.

use log::{debug, info};

use crate::{error::Error, flasher::Flasher, progress::ProgressCallbacks};

/// Write `image` to flash, skipping pages that are erased or already hold the
/// wanted content. Returns the number of pages actually written.
///
/// An image reaching into the trailing bootloader region is refused unless
/// `allow_boot_overwrite` is set.
pub fn program_flash(
    flasher: &mut Flasher,
    image: &[u8],
    allow_boot_overwrite: bool,
    progress: &mut dyn ProgressCallbacks,
) -> Result<u32, Error> {
    let profile = *flasher.profile().ok_or(Error::NotIdentified)?;
    let page_bytes = profile.page_bytes();

    let mut image = image.to_vec();
    let pages = image.len().div_ceil(page_bytes) as u32;
    image.resize(pages as usize * page_bytes, 0xff);

    if pages > profile.app_pages() && !allow_boot_overwrite {
        return Err(Error::BootloaderOverwrite {
            image_pages: pages,
            app_pages: profile.app_pages(),
        });
    }

    progress.init("flash", pages as usize);

    let mut changed = 0;
    for page in 0..pages {
        let new_page = &image[page as usize * page_bytes..(page as usize + 1) * page_bytes];

        // Erased pages are never transferred, matching the sparse image
        // convention of the HEX codec.
        if new_page.iter().all(|b| *b == 0xff) {
            progress.update(page as usize + 1);
            continue;
        }

        let old_page = flasher.read_flash_page(page)?;
        if old_page == new_page {
            progress.update(page as usize + 1);
            continue;
        }

        debug!("page {page} differs, writing");
        flasher.write_flash_page(page, new_page)?;
        if flasher.read_flash_page(page)? != new_page {
            progress.finish();
            return Err(Error::VerifyFailed { page });
        }

        changed += 1;
        progress.update(page as usize + 1);
    }

    progress.finish();
    info!("flash programmed, {changed} of {pages} pages written");
    Ok(changed)
}

/// Write `image` to EEPROM one differing byte at a time, then verify the
/// whole EEPROM with a read-back. Returns the number of bytes written.
pub fn program_eeprom(
    flasher: &mut Flasher,
    image: &[u8],
    progress: &mut dyn ProgressCallbacks,
) -> Result<u32, Error> {
    let old = flasher.read_eeprom()?;
    if image.len() > old.len() {
        return Err(Error::EepromImageTooBig {
            got: image.len(),
            size: old.len(),
        });
    }

    let mut new = image.to_vec();
    new.resize(old.len(), 0xff);

    progress.init("eeprom", new.len());

    let mut changed = 0;
    for (address, (old_byte, new_byte)) in old.iter().zip(new.iter()).enumerate() {
        if old_byte != new_byte {
            flasher.write_eeprom_byte(address as u32, *new_byte)?;
            changed += 1;
        }
        progress.update(address + 1);
    }

    progress.finish();

    if flasher.read_eeprom()? != new {
        return Err(Error::EepromVerifyFailed);
    }

    info!("eeprom programmed, {changed} bytes written");
    Ok(changed)
}

/// Read flash contents page by page. `include_boot` extends the read into the
/// reserved bootloader region.
pub fn read_flash(
    flasher: &mut Flasher,
    include_boot: bool,
    progress: &mut dyn ProgressCallbacks,
) -> Result<Vec<u8>, Error> {
    let profile = *flasher.profile().ok_or(Error::NotIdentified)?;
    let last_page = if include_boot {
        profile.flash_pages
    } else {
        profile.app_pages()
    };

    progress.init("read", last_page as usize);

    let mut image = Vec::with_capacity(last_page as usize * profile.page_bytes());
    for page in 0..last_page {
        image.extend_from_slice(&flasher.read_flash_page(page)?);
        progress.update(page as usize + 1);
    }

    progress.finish();
    Ok(image)
}
