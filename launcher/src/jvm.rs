//! Loading the bundled JVM and calling into it through JNI.

use std::ffi::{c_char, c_void, CString};
use std::mem::ManuallyDrop;
use std::path::Path;
use std::ptr;

use jni_sys::{
    jclass, jint, jmethodID, jobject, jobjectArray, jsize, jstring, jvalue, JNIEnv, JavaVM,
    JavaVMInitArgs, JavaVMOption, JNI_FALSE, JNI_OK, JNI_VERSION_1_6,
};
use libloading::{Library, Symbol};
use log::{debug, info, warn};

use crate::LaunchError;

type CreateJavaVm =
    unsafe extern "system" fn(pvm: *mut *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint;

/// Calls an entry of a JNI function table, failing the enclosing function
/// when the table does not provide it.
macro_rules! jni {
    ($table:expr, $name:ident $(, $arg:expr)* $(,)?) => {
        match (**$table).$name {
            Some(f) => f($table $(, $arg)*),
            None => return Err(LaunchError::MissingJniFunction(stringify!($name))),
        }
    };
}

const MAIN_SIGNATURE: &str = "([Ljava/lang/String;)V";

pub fn cstring(s: &str) -> Result<CString, LaunchError> {
    CString::new(s).map_err(|e| LaunchError::InvalidString(s.to_owned(), e))
}

/// Converts VM arguments to the C strings `JavaVMOption` points at.
pub fn vm_options(vm_args: &[String]) -> Result<Vec<CString>, LaunchError> {
    vm_args.iter().map(|arg| cstring(arg)).collect()
}

/// A JVM created in this process and attached to the creating thread.
///
/// The JNI environment is only valid on that thread, so `Jvm` is neither
/// `Send` nor `Sync`.
pub struct Jvm {
    vm: *mut JavaVM,
    env: *mut JNIEnv,
    // daemon threads may outlive DestroyJavaVM, so libjvm is never unloaded
    _library: ManuallyDrop<Library>,
}

impl Jvm {
    pub fn create(libjvm: &Path, vm_args: &[String]) -> Result<Jvm, LaunchError> {
        info!("Loading JVM library {} ...", libjvm.display());
        let library = unsafe { Library::new(libjvm) }.map_err(|source| LaunchError::LibraryLoad {
            path: libjvm.to_path_buf(),
            source,
        })?;
        let create_vm: CreateJavaVm = unsafe {
            let symbol: Symbol<CreateJavaVm> = library
                .get(b"JNI_CreateJavaVM\0")
                .map_err(|e| LaunchError::MissingSymbol("JNI_CreateJavaVM", e))?;
            *symbol
        };
        info!("JNI initialized.");

        let option_strings = vm_options(vm_args)?;
        let mut options: Vec<JavaVMOption> = option_strings
            .iter()
            .map(|s| JavaVMOption {
                optionString: s.as_ptr() as *mut c_char,
                extraInfo: ptr::null_mut(),
            })
            .collect();
        let mut init_args = JavaVMInitArgs {
            version: JNI_VERSION_1_6,
            nOptions: options.len() as jint,
            options: options.as_mut_ptr(),
            ignoreUnrecognized: JNI_FALSE,
        };

        info!("Creating JVM instance ...");
        let mut vm: *mut JavaVM = ptr::null_mut();
        let mut env: *mut c_void = ptr::null_mut();
        let code = unsafe {
            create_vm(&mut vm, &mut env, &mut init_args as *mut JavaVMInitArgs as *mut c_void)
        };
        if code != JNI_OK {
            return Err(LaunchError::CreateVm(code));
        }

        let mut jvm = Jvm {
            vm,
            env: env as *mut JNIEnv,
            _library: ManuallyDrop::new(library),
        };
        jvm.attach_current_thread()?;
        info!("JVM attached to thread ...");
        Ok(jvm)
    }

    fn attach_current_thread(&mut self) -> Result<(), LaunchError> {
        let mut env: *mut c_void = ptr::null_mut();
        let code = unsafe { jni!(self.vm, AttachCurrentThread, &mut env, ptr::null_mut()) };
        if code != JNI_OK {
            return Err(LaunchError::AttachThread(code));
        }
        self.env = env as *mut JNIEnv;
        Ok(())
    }

    fn env(&self) -> Env {
        Env { raw: self.env }
    }

    /// Loads `main_class` from `jar` through a fresh `URLClassLoader` and
    /// runs its `main(String[])` with `args`.
    pub fn invoke_main(&self, jar: &str, main_class: &str, args: &[String]) -> Result<(), LaunchError> {
        let env = self.env();

        debug!("class path: {}", jar);
        let loader = env.jar_class_loader(jar)?;
        env.set_context_class_loader(loader)?;

        let class = env.load_class(loader, main_class)?;
        let main = env.static_method(class, "main", MAIN_SIGNATURE)?;
        if main.is_null() {
            return Err(LaunchError::MainNotFound(main_class.to_owned()));
        }

        let argv = env.string_array(args)?;

        info!("Invoking {}.main()", main_class);
        let call_args = [jvalue { l: argv }];
        unsafe { jni!(env.raw, CallStaticVoidMethodA, class, main, call_args.as_ptr()) };
        env.check("running main()")?;

        info!("Quit from JVM ...");
        Ok(())
    }
}

impl Drop for Jvm {
    fn drop(&mut self) {
        let code = unsafe {
            match (**self.vm).DestroyJavaVM {
                Some(destroy) => destroy(self.vm),
                None => return,
            }
        };
        if code != JNI_OK {
            warn!("DestroyJavaVM failed with code {}", code);
        }
    }
}

struct Env {
    raw: *mut JNIEnv,
}

impl Env {
    /// Describes and clears a pending exception; true if there was one.
    fn take_exception(&self) -> Result<bool, LaunchError> {
        unsafe {
            if jni!(self.raw, ExceptionCheck) == JNI_FALSE {
                return Ok(false);
            }
            jni!(self.raw, ExceptionDescribe);
            jni!(self.raw, ExceptionClear);
        }
        Ok(true)
    }

    fn check(&self, context: &'static str) -> Result<(), LaunchError> {
        if self.take_exception()? {
            return Err(LaunchError::JavaException(context));
        }
        Ok(())
    }

    fn find_class(&self, name: &str) -> Result<jclass, LaunchError> {
        let c_name = cstring(name)?;
        let class = unsafe { jni!(self.raw, FindClass, c_name.as_ptr()) };
        if self.take_exception()? || class.is_null() {
            return Err(LaunchError::ClassNotFound(name.to_owned()));
        }
        Ok(class)
    }

    fn method(&self, class: jclass, name: &str, sig: &str) -> Result<jmethodID, LaunchError> {
        let (c_name, c_sig) = (cstring(name)?, cstring(sig)?);
        let method = unsafe { jni!(self.raw, GetMethodID, class, c_name.as_ptr(), c_sig.as_ptr()) };
        self.check("resolving a method")?;
        Ok(method)
    }

    /// Null when the class has no such static method.
    fn static_method(&self, class: jclass, name: &str, sig: &str) -> Result<jmethodID, LaunchError> {
        let (c_name, c_sig) = (cstring(name)?, cstring(sig)?);
        let method =
            unsafe { jni!(self.raw, GetStaticMethodID, class, c_name.as_ptr(), c_sig.as_ptr()) };
        if self.take_exception()? {
            return Ok(ptr::null_mut());
        }
        Ok(method)
    }

    fn new_string(&self, s: &str) -> Result<jstring, LaunchError> {
        let c_str = cstring(s)?;
        let string = unsafe { jni!(self.raw, NewStringUTF, c_str.as_ptr()) };
        self.check("creating a string")?;
        Ok(string)
    }

    fn new_object(&self, class: jclass, sig: &str, args: &[jvalue]) -> Result<jobject, LaunchError> {
        let ctor = self.method(class, "<init>", sig)?;
        let object = unsafe { jni!(self.raw, NewObjectA, class, ctor, args.as_ptr()) };
        self.check("constructing an object")?;
        Ok(object)
    }

    fn call_object(
        &self,
        object: jobject,
        method: jmethodID,
        args: &[jvalue],
        context: &'static str,
    ) -> Result<jobject, LaunchError> {
        let result = unsafe { jni!(self.raw, CallObjectMethodA, object, method, args.as_ptr()) };
        self.check(context)?;
        Ok(result)
    }

    fn object_array(&self, class: jclass, elements: &[jobject]) -> Result<jobjectArray, LaunchError> {
        let array = unsafe {
            jni!(self.raw, NewObjectArray, elements.len() as jsize, class, ptr::null_mut())
        };
        self.check("allocating an array")?;
        for (i, element) in elements.iter().enumerate() {
            unsafe { jni!(self.raw, SetObjectArrayElement, array, i as jsize, *element) };
            self.check("filling an array")?;
        }
        Ok(array)
    }

    fn string_array(&self, args: &[String]) -> Result<jobjectArray, LaunchError> {
        let string_class = self.find_class("java/lang/String")?;
        let mut strings = Vec::with_capacity(args.len());
        for arg in args {
            info!("Application argument: {}", arg);
            strings.push(self.new_string(arg)?);
        }
        self.object_array(string_class, &strings)
    }

    /// `new URLClassLoader(new URL[] { new File(jar).toURI().toURL() })`
    fn jar_class_loader(&self, jar: &str) -> Result<jobject, LaunchError> {
        let file_class = self.find_class("java/io/File")?;
        let path = self.new_string(jar)?;
        let file = self.new_object(file_class, "(Ljava/lang/String;)V", &[jvalue { l: path }])?;

        let to_uri = self.method(file_class, "toURI", "()Ljava/net/URI;")?;
        let uri = self.call_object(file, to_uri, &[], "converting the jar path to a URI")?;

        let uri_class = self.find_class("java/net/URI")?;
        let to_url = self.method(uri_class, "toURL", "()Ljava/net/URL;")?;
        let url = self.call_object(uri, to_url, &[], "converting the jar URI to a URL")?;

        let url_class = self.find_class("java/net/URL")?;
        let urls = self.object_array(url_class, &[url])?;

        let loader_class = self.find_class("java/net/URLClassLoader")?;
        self.new_object(loader_class, "([Ljava/net/URL;)V", &[jvalue { l: urls }])
    }

    fn set_context_class_loader(&self, loader: jobject) -> Result<(), LaunchError> {
        let thread_class = self.find_class("java/lang/Thread")?;
        let current = self.static_method(thread_class, "currentThread", "()Ljava/lang/Thread;")?;
        if current.is_null() {
            return Err(LaunchError::JavaException("resolving Thread.currentThread()"));
        }
        let thread = unsafe {
            jni!(self.raw, CallStaticObjectMethodA, thread_class, current, ptr::null())
        };
        self.check("querying the current thread")?;

        let set_loader =
            self.method(thread_class, "setContextClassLoader", "(Ljava/lang/ClassLoader;)V")?;
        let args = [jvalue { l: loader }];
        unsafe { jni!(self.raw, CallVoidMethodA, thread, set_loader, args.as_ptr()) };
        self.check("installing the context class loader")
    }

    fn load_class(&self, loader: jobject, name: &str) -> Result<jclass, LaunchError> {
        let loader_class = self.find_class("java/lang/ClassLoader")?;
        let load = self.method(loader_class, "loadClass", "(Ljava/lang/String;)Ljava/lang/Class;")?;
        let c_name = self.new_string(name)?;
        let args = [jvalue { l: c_name }];
        let class = unsafe { jni!(self.raw, CallObjectMethodA, loader, load, args.as_ptr()) };
        if self.take_exception()? || class.is_null() {
            return Err(LaunchError::ClassNotFound(name.to_owned()));
        }
        Ok(class as jclass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vm_options_keep_order() {
        let args = vec!["-Xmx512m".to_owned(), "-Dfoo=bar baz".to_owned()];
        let options = vm_options(&args).unwrap();
        let back: Vec<_> = options.iter().map(|c| c.to_str().unwrap()).collect();
        assert_eq!(back, vec!["-Xmx512m", "-Dfoo=bar baz"]);
    }

    #[test]
    fn vm_options_reject_nul() {
        let args = vec!["-Xmx512m".to_owned(), "-Dbad=\0".to_owned()];
        match vm_options(&args) {
            Err(LaunchError::InvalidString(s, _)) => assert_eq!(s, "-Dbad=\0"),
            other => panic!("unexpected {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn missing_library_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libjvm.so");
        match Jvm::create(&path, &[]) {
            Err(LaunchError::LibraryLoad { path: p, .. }) => assert_eq!(p, path),
            Err(other) => panic!("unexpected {:?}", other),
            Ok(_) => panic!("created a JVM from a missing library"),
        }
    }
}
